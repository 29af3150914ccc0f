//! Completion callbacks.
//!
//! A job may name one object to notify when it completes. Each
//! [`CallbackTarget`] has a handler registered here; the registry invokes
//! it at most once per job, fenced by [`JobStore::claim_callback`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jobhub_core::callbacks::{
    doi_registration, review_extraction, snapshot_files, CallbackTarget,
};
use jobhub_core::error::CoreError;
use jobhub_core::types::DbId;
use jobhub_db::models::job::Job;
use jobhub_db::repositories::{DoiRepo, ReviewRepo, SnapshotRepo};
use jobhub_db::DbPool;

use crate::error::EngineError;
use crate::store::{JobStore, StoreError};

/// Receives a job once it has completed.
#[async_trait]
pub trait OnJobComplete: Send + Sync {
    async fn on_job_complete(&self, target_id: DbId, job: &Job) -> Result<(), EngineError>;
}

/// Handlers by callback target.
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    handlers: HashMap<CallbackTarget, Arc<dyn OnJobComplete>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers for all targets, writing to PostgreSQL.
    pub fn postgres(pool: DbPool) -> Self {
        Self::new()
            .register(
                CallbackTarget::Snapshot,
                Arc::new(SnapshotCallback { pool: pool.clone() }),
            )
            .register(CallbackTarget::Doi, Arc::new(DoiCallback { pool: pool.clone() }))
            .register(CallbackTarget::Review, Arc::new(ReviewCallback { pool }))
    }

    pub fn register(mut self, target: CallbackTarget, handler: Arc<dyn OnJobComplete>) -> Self {
        self.handlers.insert(target, handler);
        self
    }

    /// Invoke the job's callback unless it has already been invoked.
    ///
    /// Failures are logged; a job's outcome never depends on its callback.
    pub async fn fire(&self, job: &Job, store: &dyn JobStore) {
        let callback = match job.callback() {
            Ok(Some(callback)) => callback,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(job_id = job.id, error = %e, "Invalid job callback");
                return;
            }
        };
        let Some(handler) = self.handlers.get(&callback.target) else {
            tracing::warn!(job_id = job.id, target = %callback.target, "No callback handler registered");
            return;
        };

        match store.claim_callback(job.id).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "Failed to claim job callback");
                return;
            }
        }

        match handler.on_job_complete(callback.id, job).await {
            Ok(()) => tracing::info!(
                job_id = job.id,
                target = %callback.target,
                target_id = callback.id,
                method = callback.method_name(),
                "Job callback completed",
            ),
            Err(e) => tracing::error!(
                job_id = job.id,
                target = %callback.target,
                target_id = callback.id,
                error = %e,
                "Job callback failed",
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL handlers
// ---------------------------------------------------------------------------

fn db_error(e: sqlx::Error) -> EngineError {
    EngineError::Store(StoreError::Database(e))
}

/// Records the files a snapshot job produced.
struct SnapshotCallback {
    pool: DbPool,
}

#[async_trait]
impl OnJobComplete for SnapshotCallback {
    async fn on_job_complete(&self, target_id: DbId, job: &Job) -> Result<(), EngineError> {
        let snapshot = SnapshotRepo::find_by_id(&self.pool, target_id)
            .await
            .map_err(db_error)?
            .ok_or(CoreError::NotFound {
                entity: "Snapshot",
                id: target_id,
            })?;
        let files = snapshot_files(job.result.as_ref());
        if files.is_empty() {
            return Ok(());
        }
        let inserted = SnapshotRepo::add_files(&self.pool, &snapshot, job.id, &files)
            .await
            .map_err(db_error)?;
        tracing::debug!(snapshot_id = snapshot.id, files = inserted, "Snapshot files recorded");
        Ok(())
    }
}

/// Records a DOI's registrar deposit.
struct DoiCallback {
    pool: DbPool,
}

#[async_trait]
impl OnJobComplete for DoiCallback {
    async fn on_job_complete(&self, target_id: DbId, job: &Job) -> Result<(), EngineError> {
        let Some(registration) = doi_registration(job.result.as_ref())? else {
            return Ok(());
        };
        DoiRepo::record_registration(&self.pool, target_id, job.id, &registration)
            .await
            .map_err(db_error)?
            .ok_or(CoreError::NotFound {
                entity: "Doi",
                id: target_id,
            })?;
        Ok(())
    }
}

/// Stores an extracted review, or marks the extraction failed.
struct ReviewCallback {
    pool: DbPool,
}

#[async_trait]
impl OnJobComplete for ReviewCallback {
    async fn on_job_complete(&self, target_id: DbId, job: &Job) -> Result<(), EngineError> {
        let extraction = review_extraction(job.result.as_ref());
        ReviewRepo::record_extraction(&self.pool, target_id, job.id, &extraction)
            .await
            .map_err(db_error)?
            .ok_or(CoreError::NotFound {
                entity: "Review",
                id: target_id,
            })?;
        Ok(())
    }
}
