//! Job entity models and DTOs.

use jobhub_core::callbacks::JobCallback;
use jobhub_core::error::CoreError;
use jobhub_core::jobs::{JobError, JobMethod, LogEntry};
use jobhub_core::status::{JobStatus, StatusId};
use jobhub_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    /// Unguessable alternative to `id` for unauthenticated access.
    #[serde(skip_serializing)]
    pub key: String,
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub project_id: Option<DbId>,
    pub account: Option<String>,
    pub description: Option<String>,
    pub creator_id: Option<DbId>,
    pub users: Vec<DbId>,
    pub anon_users: Vec<String>,
    pub zone_id: Option<DbId>,
    pub queue_id: Option<DbId>,
    #[serde(rename = "status", serialize_with = "serialize_status")]
    pub status_id: StatusId,
    pub parent_id: Option<DbId>,
    /// Order among the siblings of `parent_id`.
    pub position: i32,
    pub began_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
    pub error: Option<Json<JobError>>,
    pub log: Json<Vec<LogEntry>>,
    pub url: Option<String>,
    pub worker: Option<String>,
    pub retries: Option<i32>,
    pub callback_type: Option<String>,
    pub callback_id: Option<DbId>,
    pub callback_method: Option<String>,
    pub callback_fired_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Serialize a status id as its label, e.g. `"RUNNING"`.
fn serialize_status<S: serde::Serializer>(id: &StatusId, serializer: S) -> Result<S::Ok, S::Error> {
    match JobStatus::from_id(*id) {
        Some(status) => serializer.serialize_str(status.as_str()),
        None => serializer.serialize_i16(*id),
    }
}

impl Job {
    /// Current status. `status_id` references `job_statuses`, so unknown ids
    /// cannot be stored; one that slips through reads as `WAITING`.
    pub fn status(&self) -> JobStatus {
        JobStatus::from_id(self.status_id).unwrap_or(JobStatus::Waiting)
    }

    pub fn method(&self) -> Result<JobMethod, CoreError> {
        self.method.parse()
    }

    pub fn is_composite(&self) -> bool {
        self.method().is_ok_and(JobMethod::is_composite)
    }

    /// Whether the job has not yet ended.
    pub fn is_active(&self) -> bool {
        !self.status().is_terminal()
    }

    pub fn callback(&self) -> Result<Option<JobCallback>, CoreError> {
        match (&self.callback_type, self.callback_id, &self.callback_method) {
            (Some(target), Some(id), Some(method)) => {
                JobCallback::from_parts(target, id, method).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Whether the job's outcome is recorded, so the broker has nothing
    /// more to tell about it.
    pub fn is_settled(&self) -> bool {
        match self.status() {
            JobStatus::Success => self.result.is_some(),
            JobStatus::Failure => self.error.is_some(),
            JobStatus::Cancelled | JobStatus::Rejected => true,
            _ => false,
        }
    }
}

/// DTO for creating a job, possibly with (nested) children.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub method: JobMethod,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub project_id: Option<DbId>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub creator_id: Option<DbId>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub callback: Option<JobCallback>,
    /// Ordered children of a composite job.
    #[serde(default)]
    pub children: Vec<NewJob>,
}

impl NewJob {
    pub fn new(method: JobMethod) -> Self {
        Self {
            method,
            params: None,
            project_id: None,
            account: None,
            creator_id: None,
            description: None,
            callback: None,
            children: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_children(mut self, children: Vec<NewJob>) -> Self {
        self.children = children;
        self
    }

    pub fn with_callback(mut self, callback: JobCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }
}

/// Fields written when a job changes. `None` leaves the column as is.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub zone_id: Option<DbId>,
    pub queue_id: Option<DbId>,
    pub began_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
    pub error: Option<JobError>,
    /// Replaces the whole log.
    pub log: Option<Vec<LogEntry>>,
    pub url: Option<String>,
    pub worker: Option<String>,
    pub retries: Option<i32>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.zone_id.is_none()
            && self.queue_id.is_none()
            && self.began_at.is_none()
            && self.ended_at.is_none()
            && self.result.is_none()
            && self.error.is_none()
            && self.log.is_none()
            && self.url.is_none()
            && self.worker.is_none()
            && self.retries.is_none()
    }
}

/// DTO for `PATCH /api/v1/jobs/{id}`: fields reported by the service that
/// watches the broker's event stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatchJob {
    pub status: Option<JobStatus>,
    pub worker: Option<String>,
    pub retries: Option<i32>,
    pub began: Option<Timestamp>,
    pub ended: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
    pub error: Option<JobError>,
    pub log: Option<Vec<LogEntry>>,
    pub url: Option<String>,
}
