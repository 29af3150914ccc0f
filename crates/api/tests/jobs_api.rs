//! Integration tests for the `/api/v1/jobs` endpoints.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, build_test_app_with, test_config, CapturedLogs};
use jobhub_broker::{TaskState, REVOKE_SIGNAL};
use jobhub_engine::JobStore;
use serde_json::json;

fn sleep_job() -> serde_json::Value {
    json!({ "method": "sleep", "params": { "seconds": 1 } })
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_dispatches_to_live_queue() {
    let t = build_test_app();
    assert_eq!(t.worker_online("w1", &["default"]).await.status(), StatusCode::OK);

    let response = t.post("/api/v1/jobs", sleep_job()).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let job = &json["data"];
    assert_eq!(job["status"], "DISPATCHED");
    assert_eq!(job["method"], "sleep");
    assert!(job.get("key").is_none(), "key must not be exposed");
    assert_eq!(t.broker.sent_ids(), vec![job["id"].to_string()]);
}

#[tokio::test]
async fn create_logs_the_new_job_once() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();
    let t = build_test_app();

    let response = t.post("/api/v1/jobs?dispatch=false", sleep_job()).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(logs.count("Job created"), 1);
}

#[tokio::test]
async fn create_without_live_queue_is_rejected() {
    let t = build_test_app();

    let response = t.post("/api/v1/jobs", sleep_job()).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "REJECTED");
    assert_eq!(json["data"]["error"]["type"], "RejectedNoQueue");
    assert!(t.broker.sent().is_empty());
}

#[tokio::test]
async fn create_without_dispatch_waits() {
    let t = build_test_app();
    t.worker_online("w1", &["default"]).await;

    let json = body_json(t.post("/api/v1/jobs?dispatch=false", sleep_job()).await).await;
    assert_eq!(json["data"]["status"], "WAITING");
    let id = json["data"]["id"].as_i64().unwrap();

    let response = t.post(&format!("/api/v1/jobs/{id}/dispatch"), json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "DISPATCHED");
}

#[tokio::test]
async fn create_rejects_atomic_job_with_children() {
    let t = build_test_app();

    let response = t
        .post(
            "/api/v1/jobs",
            json!({ "method": "convert", "children": [sleep_job()] }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn composite_job_dispatches_children() {
    let t = build_test_app();
    t.worker_online("w1", &["default"]).await;

    let json = body_json(
        t.post(
            "/api/v1/jobs",
            json!({ "method": "parallel", "children": [sleep_job(), sleep_job()] }),
        )
        .await,
    )
    .await;
    assert_eq!(json["data"]["status"], "RUNNING");
    let id = json["data"]["id"].as_i64().unwrap();

    let children = body_json(t.get(&format!("/api/v1/jobs/{id}/children")).await).await;
    let statuses: Vec<_> = children["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["status"].clone())
        .collect();
    assert_eq!(statuses, vec![json!("DISPATCHED"), json!("DISPATCHED")]);
    assert_eq!(t.broker.sent().len(), 2);
}

// ---------------------------------------------------------------------------
// Read / update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_refreshes_status_from_broker() {
    let t = build_test_app();
    t.worker_online("w1", &["default"]).await;
    let json = body_json(t.post("/api/v1/jobs", sleep_job()).await).await;
    let id = json["data"]["id"].as_i64().unwrap();

    t.broker.set_state(
        id.to_string(),
        TaskState::Running {
            meta: Some(json!({ "url": "ws://10.0.0.3:9000" })),
        },
    );
    let response = t.get(&format!("/api/v1/jobs/{id}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let job = body_json(response).await["data"].clone();
    assert_eq!(job["status"], "RUNNING");
    assert_eq!(job["url"], "ws://10.0.0.3:9000");
}

#[tokio::test]
async fn patch_records_session_progress() {
    let t = build_test_app();
    t.worker_online("w1", &["default"]).await;
    let json = body_json(t.post("/api/v1/jobs", json!({ "method": "session" })).await).await;
    let id = json["data"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/jobs/{id}");

    let response = t
        .patch(&uri, json!({ "status": "RUNNING", "url": "ws://10.0.0.3:9000" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "RUNNING");

    let response = t
        .patch(&uri, json!({ "log": [{ "level": 1, "message": "careful" }] }))
        .await;
    let job = body_json(response).await["data"].clone();
    assert_eq!(job["status"], "RUNNING");
    assert_eq!(job["url"], "ws://10.0.0.3:9000");
    assert_eq!(job["log"][0]["message"], "careful");
}

#[tokio::test]
async fn get_by_key_finds_job() {
    let t = build_test_app();
    let json = body_json(t.post("/api/v1/jobs?dispatch=false", sleep_job()).await).await;
    let id = json["data"]["id"].as_i64().unwrap();
    let key = t.store.get(id).await.unwrap().unwrap().key;

    let response = t.get(&format!("/api/v1/jobs/key/{key}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["id"], id);
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let t = build_test_app();

    let response = t.get("/api/v1/jobs/999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");

    let response = t.get("/api/v1/jobs/key/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_revokes_dispatched_job() {
    let t = build_test_app();
    t.worker_online("w1", &["default"]).await;
    let json = body_json(t.post("/api/v1/jobs", sleep_job()).await).await;
    let id = json["data"]["id"].as_i64().unwrap();

    let response = t.post(&format!("/api/v1/jobs/{id}/cancel"), json!({})).await;

    assert_eq!(response.status(), StatusCode::OK);
    let job = body_json(response).await["data"].clone();
    assert_eq!(job["status"], "CANCELLED");
    assert!(job["ended_at"].is_string());
    let revoked = t.broker.revoked();
    assert_eq!(revoked.len(), 1);
    assert_eq!(revoked[0].task_id, id.to_string());
    assert_eq!(revoked[0].signal, REVOKE_SIGNAL);

    // Cancelling again is a no-op.
    let response = t.post(&format!("/api/v1/jobs/{id}/cancel"), json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(t.broker.revoked().len(), 1);
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn api_token_is_required_when_configured() {
    let mut config = test_config();
    config.api_token = Some("s3cret".into());
    let t = build_test_app_with(config);

    let response = t.get("/api/v1/jobs/1").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");

    let request = axum::http::Request::builder()
        .uri("/api/v1/jobs/1")
        .header("authorization", "Bearer s3cret")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(t.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
