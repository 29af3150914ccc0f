pub mod health;
pub mod jobs;
pub mod workers;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                      create (POST)
/// /jobs/key/{key}            get by key
/// /jobs/{id}                 get, update (PATCH)
/// /jobs/{id}/children        list children
/// /jobs/{id}/dispatch        dispatch (POST)
/// /jobs/{id}/cancel          cancel (POST)
///
/// /workers/online            worker came online (POST)
/// /workers/heartbeat         worker heartbeat (POST)
/// /workers/offline           worker went offline (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/workers", workers::router())
}
