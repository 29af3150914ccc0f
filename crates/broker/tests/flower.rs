//! `FlowerBroker` against a local axum server standing in for the gateway.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use jobhub_broker::{Broker, BrokerError, FlowerBroker, TaskSignature, TaskState};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Recorded {
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn send_task(
    State(rec): State<Recorded>,
    Path(method): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if method == "teleport" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "Unknown task"})));
    }
    rec.requests.lock().unwrap().push((format!("send:{method}"), body));
    (StatusCode::OK, Json(json!({"task-id": "1"})))
}

async fn task_result(Path(task_id): Path<String>) -> Json<Value> {
    match task_id.as_str() {
        "1" => Json(json!({"task-id": "1", "state": "RUNNING", "result": {"url": "ws://10.0.0.1:8000"}})),
        "2" => Json(json!({"task-id": "2", "state": "FAILURE", "result": "ValueError('boom')", "traceback": "..."})),
        _ => Json(json!({"task-id": task_id, "state": "PENDING"})),
    }
}

async fn revoke(
    State(rec): State<Recorded>,
    Path(task_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    rec.requests
        .lock()
        .unwrap()
        .push((format!("revoke:{task_id}"), json!(params)));
    Json(json!({"message": "Revoked"}))
}

async fn spawn_gateway() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/api/task/send-task/{method}", post(send_task))
        .route("/api/task/result/{task_id}", get(task_result))
        .route("/api/task/revoke/{task_id}", post(revoke))
        .with_state(recorded.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), recorded)
}

fn task(method: &str) -> TaskSignature {
    TaskSignature {
        method: method.into(),
        kwargs: json!({"seconds": 3}),
        queue: "default:1".into(),
        task_id: "1".into(),
    }
}

#[tokio::test]
async fn send_task_posts_kwargs_queue_and_id() {
    let (url, recorded) = spawn_gateway().await;
    let broker = FlowerBroker::new(format!("{url}/"));

    broker.send_task(&task("sleep")).await.unwrap();

    let requests = recorded.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "send:sleep");
    assert_eq!(
        requests[0].1,
        json!({"kwargs": {"seconds": 3}, "queue": "default:1", "task_id": "1"})
    );
}

#[tokio::test]
async fn unknown_task_is_refused() {
    let (url, _) = spawn_gateway().await;
    let broker = FlowerBroker::new(url);
    assert_matches!(
        broker.send_task(&task("teleport")).await,
        Err(BrokerError::Refused(_))
    );
}

#[tokio::test]
async fn task_state_maps_backend_states() {
    let (url, _) = spawn_gateway().await;
    let broker = FlowerBroker::new(url);

    assert_eq!(
        broker.task_state("1").await.unwrap(),
        TaskState::Running {
            meta: Some(json!({"url": "ws://10.0.0.1:8000"}))
        }
    );
    assert_eq!(
        broker.task_state("2").await.unwrap(),
        TaskState::Failure {
            error_type: "ValueError".into(),
            message: "boom".into()
        }
    );
    assert_eq!(broker.task_state("3").await.unwrap(), TaskState::Pending);
}

#[tokio::test]
async fn revoke_sends_terminate_and_signal() {
    let (url, recorded) = spawn_gateway().await;
    let broker = FlowerBroker::new(url);

    broker.revoke("42", true, "SIGUSR1").await.unwrap();

    let requests = recorded.requests.lock().unwrap().clone();
    assert_eq!(requests[0].0, "revoke:42");
    assert_eq!(requests[0].1, json!({"terminate": "true", "signal": "SIGUSR1"}));
}
