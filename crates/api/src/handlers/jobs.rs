//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use jobhub_core::types::DbId;
use jobhub_db::models::job::{NewJob, PatchJob};
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::ServiceAuth;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateJobQuery {
    /// Dispatch the job right after creating it (default `true`).
    #[serde(default = "default_dispatch")]
    pub dispatch: bool,
}

fn default_dispatch() -> bool {
    true
}

/// POST /api/v1/jobs
///
/// Create a job tree and, unless `?dispatch=false`, dispatch it. Returns
/// 201 with the root job. A job that finds no live queue is returned
/// `REJECTED` rather than failing the request.
pub async fn create_job(
    _auth: ServiceAuth,
    State(state): State<AppState>,
    Query(query): Query<CreateJobQuery>,
    Json(input): Json<NewJob>,
) -> AppResult<impl IntoResponse> {
    let mut job = state.engine.create(input).await?;
    if query.dispatch {
        job = state.engine.dispatch(job.id).await?;
    }

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Reading a job refreshes its status from the broker first.
pub async fn get_job(
    _auth: ServiceAuth,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.engine.get(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/jobs/key/{key}
pub async fn get_job_by_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = state.engine.get_by_key(&key).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/jobs/{id}/children
pub async fn list_children(
    _auth: ServiceAuth,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let children = state.engine.children(job_id).await?;
    Ok(Json(DataResponse { data: children }))
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// PATCH /api/v1/jobs/{id}
///
/// Record progress reported for a job: by the service following the
/// broker's event stream, or by a session worker.
pub async fn update_job(
    _auth: ServiceAuth,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Json(patch): Json<PatchJob>,
) -> AppResult<impl IntoResponse> {
    let job = state.engine.update(job_id, patch).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Dispatch / cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/dispatch
///
/// No-op for a job that has already left `WAITING`.
pub async fn dispatch_job(
    _auth: ServiceAuth,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.engine.dispatch(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/cancel
///
/// No-op for a job that has already ended.
pub async fn cancel_job(
    _auth: ServiceAuth,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.engine.cancel(job_id).await?;
    tracing::info!(job_id, status = %job.status(), "Job cancel requested");
    Ok(Json(DataResponse { data: job }))
}
