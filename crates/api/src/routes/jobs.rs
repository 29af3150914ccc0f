//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                -> create_job
/// GET    /key/{key}       -> get_job_by_key
/// GET    /{id}            -> get_job
/// PATCH  /{id}            -> update_job
/// GET    /{id}/children   -> list_children
/// POST   /{id}/dispatch   -> dispatch_job
/// POST   /{id}/cancel     -> cancel_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::create_job))
        .route("/key/{key}", get(jobs::get_job_by_key))
        .route("/{id}", get(jobs::get_job).patch(jobs::update_job))
        .route("/{id}/children", get(jobs::list_children))
        .route("/{id}/dispatch", post(jobs::dispatch_job))
        .route("/{id}/cancel", post(jobs::cancel_job))
}
