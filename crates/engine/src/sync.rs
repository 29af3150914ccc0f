//! Status synchronizer: pulls an atomic job's state from the broker's
//! result backend.

use chrono::Utc;
use jobhub_broker::TaskState;
use jobhub_core::jobs::{JobError, ProgressPayload};
use jobhub_core::status::JobStatus;
use jobhub_core::types::Timestamp;
use jobhub_db::models::job::{Job, JobUpdate};

use crate::engine::JobEngine;
use crate::error::EngineResult;

impl JobEngine {
    /// Bring an atomic job up to date with the broker.
    ///
    /// `WAITING` jobs were never sent and settled jobs have nothing more
    /// to learn, so neither is queried. A broker that cannot be reached
    /// leaves the job as it is.
    pub(crate) async fn sync(&self, job: Job, propagate: bool) -> EngineResult<Job> {
        if job.status() == JobStatus::Waiting || job.is_settled() {
            return Ok(job);
        }

        let state = match self.broker.task_state(&job.id.to_string()).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(job_id = job.id, error = %e, "Failed to read task state");
                return Ok(job);
            }
        };

        let Some(update) = state_update(&job, &state, Utc::now()) else {
            return Ok(job);
        };
        let job = self.apply_or_reload(&job, update).await?;

        if propagate {
            self.recheck_parent(&job).await?;
        }
        Ok(job)
    }
}

/// The change a task state makes to a job, if any.
///
/// A state never moves a job to a lower-ranked status, and a terminal job
/// only takes the outcome it is missing (e.g. the result of a job marked
/// `SUCCESS` by an event before the result was stored).
pub(crate) fn state_update(job: &Job, state: &TaskState, now: Timestamp) -> Option<JobUpdate> {
    let mut update = JobUpdate::default();
    let status = match state {
        TaskState::Pending => return None,
        TaskState::Received => JobStatus::Received,
        TaskState::Started => JobStatus::Started,
        TaskState::Running { meta } => {
            if let Some(meta) = meta {
                let payload = ProgressPayload::from_value(meta);
                update.result = payload.result;
                update.log = payload.log;
                update.url = payload.url;
            }
            JobStatus::Running
        }
        TaskState::Success { payload } => {
            let payload = payload
                .as_ref()
                .map(ProgressPayload::from_value)
                .unwrap_or_default();
            // Null still records that the job finished with a result.
            update.result = Some(payload.result.unwrap_or(serde_json::Value::Null));
            update.log = payload.log;
            update.url = payload.url;
            JobStatus::Success
        }
        TaskState::Failure {
            error_type,
            message,
        } => {
            update.error = Some(JobError::new(error_type, message));
            JobStatus::Failure
        }
        TaskState::Revoked => JobStatus::Cancelled,
    };

    let current = job.status();
    if current.can_advance_to(status) {
        update.status = Some(status);
    } else if status != current || (current.is_terminal() && job.is_settled()) {
        return None;
    }

    if matches!(status, JobStatus::Started | JobStatus::Running) && job.began_at.is_none() {
        update.began_at = Some(now);
    }
    if status.is_terminal() && job.ended_at.is_none() {
        update.ended_at = Some(now);
    }

    (!update.is_empty()).then_some(update)
}
