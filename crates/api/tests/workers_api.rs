//! Integration tests for the `/api/v1/workers` event endpoints.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, worker_event};
use serde_json::json;

#[tokio::test]
async fn online_registers_worker_and_queues() {
    let t = build_test_app();

    let response = t.worker_online("w1", &["default:2", "gpu:1:untrusted", "bad name!"]).await;

    assert_eq!(response.status(), StatusCode::OK);
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["worker"]["hostname"], "w1");
    assert!(data["worker"]["finished_at"].is_null());
    let names: Vec<_> = data["queues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("default:2"), json!("gpu:1:untrusted")]);
    assert_eq!(data["queues"][1]["untrusted"], true);
    assert_eq!(data["queues"][0]["priority"], 2);
}

#[tokio::test]
async fn heartbeat_records_load() {
    let t = build_test_app();
    t.worker_online("w1", &["default"]).await;

    let mut event = worker_event("w1", &["default"]);
    event["clock"] = json!(42);
    event["active"] = json!(1);
    event["processed"] = json!(7);
    event["loadavg"] = json!([0.5, 0.25, 0.1]);
    let response = t.post("/api/v1/workers/heartbeat", event).await;

    assert_eq!(response.status(), StatusCode::OK);
    let heartbeat = body_json(response).await["data"].clone();
    assert_eq!(heartbeat["clock"], 42);
    assert_eq!(heartbeat["processed"], 7);
    assert_eq!(heartbeat["load"], json!([0.5, 0.25, 0.1]));
}

#[tokio::test]
async fn offline_worker_no_longer_takes_jobs() {
    let t = build_test_app();
    t.worker_online("w1", &["default"]).await;

    let response = t
        .post("/api/v1/workers/offline", worker_event("w1", &["default"]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["data"]["finished_at"].is_string());

    let job = body_json(t.post("/api/v1/jobs", json!({ "method": "sleep" })).await).await;
    assert_eq!(job["data"]["status"], "REJECTED");
}

#[tokio::test]
async fn malformed_event_is_rejected() {
    let t = build_test_app();

    let response = t
        .post("/api/v1/workers/online", json!({ "pid": "not a number" }))
        .await;

    assert!(response.status().is_client_error());
}
