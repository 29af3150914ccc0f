//! Dispatcher: maps atomic jobs onto live queues and drives composite
//! jobs through their children.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use jobhub_broker::TaskSignature;
use jobhub_core::composite;
use jobhub_core::fleet::select_queue;
use jobhub_core::jobs::{error_kind, JobError, LogEntry};
use jobhub_core::status::JobStatus;
use jobhub_core::types::DbId;
use jobhub_db::models::job::{Job, JobUpdate};

use crate::engine::JobEngine;
use crate::error::EngineResult;

impl JobEngine {
    /// Dispatch a job. A no-op unless the job is `WAITING`.
    ///
    /// Atomic jobs end up `DISPATCHED` on the best live queue or
    /// `REJECTED`. Composite jobs become `RUNNING` and dispatch the
    /// children their method allows.
    pub async fn dispatch(&self, id: DbId) -> EngineResult<Job> {
        let job = self.load(id).await?;
        self.dispatch_job(job, true).await
    }

    pub(crate) fn dispatch_job(&self, job: Job, propagate: bool) -> BoxFuture<'_, EngineResult<Job>> {
        async move {
            if job.status() != JobStatus::Waiting {
                return Ok(job);
            }
            let job = if job.is_composite() {
                self.dispatch_composite(job).await?
            } else {
                self.dispatch_atomic(job).await?
            };
            if propagate {
                self.recheck_parent(&job).await?;
            }
            Ok(job)
        }
        .boxed()
    }

    async fn dispatch_composite(&self, job: Job) -> EngineResult<Job> {
        let update = JobUpdate {
            status: Some(JobStatus::Running),
            began_at: Some(Utc::now()),
            ..Default::default()
        };
        match self.apply(&job, update).await? {
            Some(running) => self.evaluate_composite(running, false).await,
            None => self.load(job.id).await,
        }
    }

    async fn dispatch_atomic(&self, job: Job) -> EngineResult<Job> {
        let method = job.method()?;

        let mut accounts: Vec<String> = job.account.iter().cloned().collect();
        if !accounts.contains(&self.config.default_zone_account) {
            accounts.push(self.config.default_zone_account.clone());
        }
        let live_since = Utc::now() - self.config.liveness_window;
        let candidates = self.fleet.queue_candidates(&accounts, live_since).await?;

        let Some(queue) = select_queue(&candidates) else {
            let message = format!(
                "No queue with a live worker is available in the zones of {}",
                accounts.join(", ")
            );
            tracing::warn!(job_id = job.id, method = %method, "{message}");
            let update = JobUpdate {
                status: Some(JobStatus::Rejected),
                ended_at: Some(Utc::now()),
                error: Some(JobError::new(error_kind::REJECTED_NO_QUEUE, &message)),
                log: Some(with_entry(&job, LogEntry::error(message))),
                ..Default::default()
            };
            return self.apply_or_reload(&job, update).await;
        };

        // Claim the job before sending so a concurrent dispatch cannot
        // place it twice.
        let update = JobUpdate {
            status: Some(JobStatus::Dispatched),
            zone_id: Some(queue.zone_id),
            queue_id: Some(queue.id),
            log: Some(with_entry(
                &job,
                LogEntry::info(format!("Dispatched to queue '{}'", queue.name)),
            )),
            ..Default::default()
        };
        let Some(dispatched) = self.apply(&job, update).await? else {
            return self.load(job.id).await;
        };

        let task = TaskSignature {
            method: method.as_str().to_string(),
            kwargs: job.params.clone().unwrap_or_else(|| serde_json::json!({})),
            queue: queue.name.clone(),
            task_id: job.id.to_string(),
        };
        match self.broker.send_task(&task).await {
            Ok(()) => {
                tracing::info!(
                    job_id = job.id,
                    method = %method,
                    queue = %queue.name,
                    priority = queue.priority,
                    "Job dispatched",
                );
                Ok(dispatched)
            }
            Err(e) => {
                tracing::error!(job_id = job.id, queue = %queue.name, error = %e, "Broker refused job");
                let message = e.to_string();
                let update = JobUpdate {
                    status: Some(JobStatus::Rejected),
                    ended_at: Some(Utc::now()),
                    error: Some(JobError::new(error_kind::BROKER_ERROR, &message)),
                    log: Some(with_entry(&dispatched, LogEntry::error(message))),
                    ..Default::default()
                };
                self.apply_or_reload(&dispatched, update).await
            }
        }
    }

    /// Bring a composite job in line with its children.
    ///
    /// Cancels children that must never run, dispatches those that may run
    /// now and repeats until nothing changes, then writes the aggregate
    /// status. With `propagate`, the parent is re-evaluated in turn.
    pub(crate) fn evaluate_composite(
        &self,
        job: Job,
        propagate: bool,
    ) -> BoxFuture<'_, EngineResult<Job>> {
        async move {
            let method = job.method()?;
            let mut job = job;

            loop {
                // Not dispatched yet, or already settled.
                if job.status() == JobStatus::Waiting || job.status().is_terminal() {
                    return Ok(job);
                }

                let children = self.jobs.children(job.id).await?;
                let statuses: Vec<JobStatus> = children.iter().map(Job::status).collect();
                let evaluation = composite::evaluate(method, &statuses);

                let mut changed = false;
                for &index in &evaluation.cancel {
                    changed |= self.skip_child(&children[index]).await?;
                }
                for &index in &evaluation.dispatch {
                    let child = self.dispatch_job(children[index].clone(), false).await?;
                    changed |= child.status() != JobStatus::Waiting;
                }
                if changed {
                    continue;
                }

                if evaluation.status == job.status() {
                    return Ok(job);
                }

                let update = aggregate_update(&job, &children, evaluation.status);
                match self.apply(&job, update).await? {
                    Some(updated) => {
                        job = updated;
                        break;
                    }
                    None => job = self.load(job.id).await?,
                }
            }

            if propagate {
                self.recheck_parent(&job).await?;
            }
            Ok(job)
        }
        .boxed()
    }

    /// Cancel a `WAITING` child that will never run. Returns whether it
    /// changed.
    async fn skip_child(&self, child: &Job) -> EngineResult<bool> {
        let update = JobUpdate {
            status: Some(JobStatus::Cancelled),
            ended_at: Some(Utc::now()),
            ..Default::default()
        };
        Ok(self.apply(child, update).await?.is_some())
    }

    pub(crate) async fn apply_or_reload(&self, job: &Job, update: JobUpdate) -> EngineResult<Job> {
        match self.apply(job, update).await? {
            Some(updated) => Ok(updated),
            None => self.load(job.id).await,
        }
    }
}

fn with_entry(job: &Job, entry: LogEntry) -> Vec<LogEntry> {
    let mut log = job.log.0.clone();
    log.push(entry);
    log
}

/// Fields written when a composite job moves to `status`.
fn aggregate_update(job: &Job, children: &[Job], status: JobStatus) -> JobUpdate {
    let mut update = JobUpdate::status(status);
    if job.began_at.is_none() {
        update.began_at = Some(Utc::now());
    }
    if status.is_terminal() {
        update.ended_at = Some(Utc::now());
    }
    match status {
        JobStatus::Success => update.result = Some(serde_json::Value::Null),
        JobStatus::Failure => {
            let failed = children.iter().find(|c| c.status().is_failed());
            update.error = Some(
                failed
                    .and_then(|c| c.error.as_ref().map(|e| e.0.clone()))
                    .unwrap_or_else(|| {
                        JobError::new(
                            error_kind::EXECUTION_FAILURE,
                            match failed {
                                Some(child) => format!("Child job {} failed", child.id),
                                None => "A child job failed".to_string(),
                            },
                        )
                    }),
            );
        }
        JobStatus::Rejected => {
            update.error = Some(JobError::new(
                error_kind::MALFORMED_GRAPH,
                format!("Composite job '{}' has no children", job.method),
            ));
            update.log = Some(with_entry(
                job,
                LogEntry::error("Composite job has no children to run"),
            ));
        }
        _ => {}
    }
    update
}
