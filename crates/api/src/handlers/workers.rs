//! Handlers for worker monitoring events forwarded from the broker.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use jobhub_core::fleet::WorkerEvent;
use jobhub_db::models::fleet::{Queue, Worker};
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::ServiceAuth;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OnlineWorker {
    pub worker: Worker,
    pub queues: Vec<Queue>,
}

/// POST /api/v1/workers/online
///
/// Register a worker and the queues it listens on.
pub async fn worker_online(
    _auth: ServiceAuth,
    State(state): State<AppState>,
    Json(event): Json<WorkerEvent>,
) -> AppResult<impl IntoResponse> {
    let (worker, queues) = state.fleet.worker_online(&event).await?;
    Ok(Json(DataResponse {
        data: OnlineWorker { worker, queues },
    }))
}

/// POST /api/v1/workers/heartbeat
pub async fn worker_heartbeat(
    _auth: ServiceAuth,
    State(state): State<AppState>,
    Json(event): Json<WorkerEvent>,
) -> AppResult<impl IntoResponse> {
    let heartbeat = state.fleet.worker_heartbeat(&event).await?;
    Ok(Json(DataResponse { data: heartbeat }))
}

/// POST /api/v1/workers/offline
pub async fn worker_offline(
    _auth: ServiceAuth,
    State(state): State<AppState>,
    Json(event): Json<WorkerEvent>,
) -> AppResult<impl IntoResponse> {
    let worker = state.fleet.worker_offline(&event).await?;
    Ok(Json(DataResponse { data: worker }))
}
