//! Route definitions for worker monitoring events.

use axum::routing::post;
use axum::Router;

use crate::handlers::workers;
use crate::state::AppState;

/// Routes mounted at `/workers`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/online", post(workers::worker_online))
        .route("/heartbeat", post(workers::worker_heartbeat))
        .route("/offline", post(workers::worker_offline))
}
