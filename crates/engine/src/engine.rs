//! The [`JobEngine`] façade: job creation, reads, explicit updates and
//! the status write path shared by the dispatcher, the synchronizer and
//! the canceller.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use jobhub_broker::Broker;
use jobhub_core::error::CoreError;
use jobhub_core::jobs::generate_job_key;
use jobhub_core::status::JobStatus;
use jobhub_core::types::DbId;
use jobhub_db::models::job::{Job, JobUpdate, NewJob, PatchJob};

use crate::callbacks::CallbackRegistry;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::store::{FleetStore, JobStore};

/// Orchestrates job trees over a store and a broker.
pub struct JobEngine {
    pub(crate) jobs: Arc<dyn JobStore>,
    pub(crate) fleet: Arc<dyn FleetStore>,
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) config: EngineConfig,
}

impl JobEngine {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        fleet: Arc<dyn FleetStore>,
        broker: Arc<dyn Broker>,
        callbacks: CallbackRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            jobs,
            fleet,
            broker,
            callbacks,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- creation ----

    /// Create a job and its (nested) children, all in `WAITING`.
    ///
    /// Children inherit the project, account and creator of their parent
    /// unless they name their own.
    pub async fn create(&self, input: NewJob) -> EngineResult<Job> {
        validate_tree(&input)?;
        let job = self.insert_tree(&input, None, 0).await?;
        tracing::info!(job_id = job.id, method = %job.method, "Job created");
        Ok(job)
    }

    fn insert_tree<'a>(
        &'a self,
        input: &'a NewJob,
        parent_id: Option<DbId>,
        position: i32,
    ) -> BoxFuture<'a, EngineResult<Job>> {
        async move {
            let job = self
                .jobs
                .insert(input, &generate_job_key(), parent_id, position)
                .await?;
            for (index, child) in input.children.iter().enumerate() {
                let child = inherit(child, input);
                self.insert_tree(&child, Some(job.id), index as i32).await?;
            }
            Ok(job)
        }
        .boxed()
    }

    // ---- reads ----

    /// Read a job, bringing it up to date with the broker first.
    ///
    /// For a composite job the active descendants are refreshed and the
    /// tree re-evaluated, so reading the root advances the whole tree.
    pub async fn get(&self, id: DbId) -> EngineResult<Job> {
        let job = self.load(id).await?;
        self.refresh(job, true).await
    }

    /// Read a job by its key, refreshing it like [`JobEngine::get`].
    pub async fn get_by_key(&self, key: &str) -> EngineResult<Job> {
        let job = self
            .jobs
            .get_by_key(key)
            .await?
            .ok_or_else(|| CoreError::NotFoundByKey {
                entity: "Job",
                key: key.to_string(),
            })?;
        self.refresh(job, true).await
    }

    /// Children of a job in execution order, as stored.
    pub async fn children(&self, id: DbId) -> EngineResult<Vec<Job>> {
        Ok(self.jobs.children(id).await?)
    }

    pub(crate) fn refresh(&self, job: Job, propagate: bool) -> BoxFuture<'_, EngineResult<Job>> {
        async move {
            if !job.is_composite() {
                return self.sync(job, propagate).await;
            }
            if job.status() != JobStatus::Waiting {
                for child in self.jobs.children(job.id).await? {
                    if child.is_active() {
                        self.refresh(child, false).await?;
                    }
                }
            }
            self.evaluate_composite(job, propagate).await
        }
        .boxed()
    }

    // ---- explicit updates ----

    /// Apply fields reported by the service watching the broker's event
    /// stream, then synchronize.
    ///
    /// A patch whose status would move the job backwards (e.g. a late
    /// `SUCCESS` after the job was cancelled) is ignored entirely. For
    /// composite jobs the patch is ignored and the job re-evaluated.
    pub async fn update(&self, id: DbId, patch: PatchJob) -> EngineResult<Job> {
        let job = self.load(id).await?;
        if job.is_composite() {
            return self.evaluate_composite(job, true).await;
        }

        let current = job.status();
        if let Some(status) = patch.status {
            if status != current && !current.can_advance_to(status) {
                tracing::debug!(
                    job_id = job.id,
                    current = %current,
                    reported = %status,
                    "Ignoring update that does not advance job status",
                );
                return Ok(job);
            }
        }

        let update = patch_update(&job, patch);
        let job = if update.is_empty() {
            job
        } else {
            match self.apply(&job, update).await? {
                Some(updated) => updated,
                None => self.load(id).await?,
            }
        };

        let job = self.sync(job, false).await?;
        self.recheck_parent(&job).await?;
        Ok(job)
    }

    // ---- shared write path ----

    pub(crate) async fn load(&self, id: DbId) -> EngineResult<Job> {
        Ok(self
            .jobs
            .get(id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Job", id })?)
    }

    /// Write `update` if the job is still in the status it was read in.
    ///
    /// Returns `None` when another writer moved the job on first. Fires
    /// the job's callback once its outcome is settled.
    pub(crate) async fn apply(&self, job: &Job, update: JobUpdate) -> EngineResult<Option<Job>> {
        let before = job.status();
        let Some(updated) = self.jobs.update_if_status(job.id, before, &update).await? else {
            tracing::debug!(job_id = job.id, status = %before, "Job changed concurrently");
            return Ok(None);
        };

        let after = updated.status();
        if after != before {
            tracing::info!(job_id = updated.id, from = %before, to = %after, "Job status changed");
        }
        if matches!(after, JobStatus::Success | JobStatus::Failure) && updated.is_settled() {
            self.callbacks.fire(&updated, self.jobs.as_ref()).await;
        }
        Ok(Some(updated))
    }

    /// Re-evaluate the parent of `job`, if any, and so on up the tree.
    pub(crate) async fn recheck_parent(&self, job: &Job) -> EngineResult<()> {
        if let Some(parent_id) = job.parent_id {
            let parent = self.load(parent_id).await?;
            self.evaluate_composite(parent, true).await?;
        }
        Ok(())
    }
}

/// Atomic methods take no children.
fn validate_tree(input: &NewJob) -> Result<(), CoreError> {
    if !input.method.is_composite() && !input.children.is_empty() {
        return Err(CoreError::Validation(format!(
            "Method '{}' is atomic and cannot have children",
            input.method
        )));
    }
    input.children.iter().try_for_each(validate_tree)
}

fn inherit(child: &NewJob, parent: &NewJob) -> NewJob {
    let mut child = child.clone();
    child.project_id = child.project_id.or(parent.project_id);
    child.creator_id = child.creator_id.or(parent.creator_id);
    if child.account.is_none() {
        child.account = parent.account.clone();
    }
    child
}

fn patch_update(job: &Job, patch: PatchJob) -> JobUpdate {
    let status = patch.status.filter(|s| *s != job.status());
    let ended_at = match status {
        Some(s) if s.is_terminal() => patch.ended.or_else(|| Some(chrono::Utc::now())),
        _ => patch.ended,
    };
    JobUpdate {
        status,
        began_at: patch.began,
        ended_at,
        result: patch.result,
        error: patch.error,
        log: patch.log,
        url: patch.url,
        worker: patch.worker,
        retries: patch.retries,
        ..Default::default()
    }
}
