//! Canceller.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use jobhub_broker::REVOKE_SIGNAL;
use jobhub_core::status::JobStatus;
use jobhub_core::types::DbId;
use jobhub_db::models::job::{Job, JobUpdate};

use crate::engine::JobEngine;
use crate::error::EngineResult;

impl JobEngine {
    /// Cancel a job and, for a composite job, all of its active children.
    ///
    /// Ended jobs are left as they are. A job that reached the broker is
    /// revoked and its worker process signalled to stop; the job is marked
    /// `CANCELLED` straight away whether or not the broker accepts the
    /// revocation.
    pub async fn cancel(&self, id: DbId) -> EngineResult<Job> {
        let job = self.load(id).await?;
        self.cancel_job(job, true).await
    }

    fn cancel_job(&self, job: Job, propagate: bool) -> BoxFuture<'_, EngineResult<Job>> {
        async move {
            if job.status().is_terminal() {
                return Ok(job);
            }

            if job.is_composite() {
                for child in self.jobs.children(job.id).await? {
                    self.cancel_job(child, false).await?;
                }
            } else if job.status() != JobStatus::Waiting {
                let task_id = job.id.to_string();
                match self.broker.revoke(&task_id, true, REVOKE_SIGNAL).await {
                    Ok(()) => tracing::info!(job_id = job.id, "Job revoked"),
                    Err(e) => {
                        tracing::error!(job_id = job.id, error = %e, "Failed to revoke job")
                    }
                }
            }

            let update = JobUpdate {
                status: Some(JobStatus::Cancelled),
                ended_at: Some(Utc::now()),
                ..Default::default()
            };
            let mut job = job;
            let job = loop {
                match self.apply(&job, update.clone()).await? {
                    Some(cancelled) => break cancelled,
                    None => {
                        job = self.load(job.id).await?;
                        if job.status().is_terminal() {
                            return Ok(job);
                        }
                    }
                }
            };

            if propagate {
                self.recheck_parent(&job).await?;
            }
            Ok(job)
        }
        .boxed()
    }
}
