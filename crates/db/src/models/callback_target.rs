//! Rows for the objects notified when a job completes.

use jobhub_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `snapshots` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Snapshot {
    pub id: DbId,
    pub project_id: DbId,
    pub job_id: Option<DbId>,
    pub path: Option<String>,
    pub created_at: Timestamp,
}

/// A row from the `files` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct File {
    pub id: DbId,
    pub project_id: DbId,
    pub snapshot_id: Option<DbId>,
    pub job_id: Option<DbId>,
    pub path: String,
    pub modified_at: Option<Timestamp>,
    pub size: Option<i64>,
    pub mimetype: Option<String>,
    pub encoding: Option<String>,
    pub created_at: Timestamp,
}

/// A row from the `dois` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Doi {
    pub id: DbId,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub job_id: Option<DbId>,
    pub deposited_at: Option<Timestamp>,
    pub registered_at: Option<Timestamp>,
    pub request: Option<serde_json::Value>,
    pub response: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Review status labels stored in `reviews.status`.
pub mod review_status {
    pub const PENDING: &str = "PENDING";
    pub const EXTRACTED: &str = "EXTRACTED";
    pub const FAILED: &str = "FAILED";
}

/// A row from the `reviews` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Review {
    pub id: DbId,
    pub project_id: DbId,
    pub job_id: Option<DbId>,
    pub status: String,
    pub review: Option<serde_json::Value>,
    pub review_date: Option<Timestamp>,
    pub review_comments: Option<i32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
