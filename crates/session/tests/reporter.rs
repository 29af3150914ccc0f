use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::patch;
use axum::{Json, Router};
use jobhub_core::jobs::LogEntry;
use jobhub_session::{HttpReporter, SessionError, SessionReporter};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Received {
    requests: Arc<Mutex<Vec<(i64, Option<String>, Value)>>>,
}

async fn patch_job(
    State(received): State<Received>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if id == 404 {
        return StatusCode::NOT_FOUND;
    }
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    received.requests.lock().unwrap().push((id, auth, body));
    StatusCode::OK
}

/// Start a stub manager and return its base URL.
async fn stub_manager(received: Received) -> String {
    let app = Router::new()
        .route("/api/v1/jobs/{id}", patch(patch_job))
        .with_state(received);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn running_patches_status_and_url() {
    let received = Received::default();
    let manager = stub_manager(received.clone()).await;
    let reporter = HttpReporter::new(&format!("{manager}/"), 42, Some("secret".into()));

    reporter.running("ws://10.0.0.3:9000").await.unwrap();

    let requests = received.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec![(
            42,
            Some("Bearer secret".to_string()),
            json!({"status": "RUNNING", "url": "ws://10.0.0.3:9000"})
        )]
    );
}

#[tokio::test]
async fn log_patches_entries_without_token() {
    let received = Received::default();
    let manager = stub_manager(received.clone()).await;
    let reporter = HttpReporter::new(&manager, 7, None);

    reporter
        .log(&[LogEntry {
            time: None,
            level: 1,
            message: "careful".into(),
        }])
        .await
        .unwrap();

    let requests = received.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1, None);
    assert_eq!(
        requests[0].2,
        json!({"log": [{"level": 1, "message": "careful"}]})
    );
}

#[tokio::test]
async fn rejected_report_is_an_error() {
    let manager = stub_manager(Received::default()).await;
    let reporter = HttpReporter::new(&manager, 404, None);

    let result = reporter.running("ws://h:1").await;

    assert_matches!(result, Err(SessionError::Report { status: 404, .. }));
}
