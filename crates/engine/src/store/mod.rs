//! Storage seams for the orchestration engine.
//!
//! The engine only needs a handful of primitive operations on jobs and on
//! the fleet registry. [`PgStore`] backs them with PostgreSQL through the
//! `jobhub-db` repositories; [`MemoryStore`] keeps everything in process
//! for tests and local development.

mod memory;
mod postgres;

use async_trait::async_trait;
use jobhub_core::fleet::{QueueCandidate, QueueSpec, WorkerEvent};
use jobhub_core::status::JobStatus;
use jobhub_core::types::{DbId, Timestamp};
use jobhub_db::models::fleet::{Queue, Worker, WorkerHeartbeat, Zone};
use jobhub_db::models::job::{Job, JobUpdate, NewJob};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors from a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence of the job tree.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a single job in `WAITING`.
    async fn insert(
        &self,
        input: &NewJob,
        key: &str,
        parent_id: Option<DbId>,
        position: i32,
    ) -> StoreResult<Job>;

    async fn get(&self, id: DbId) -> StoreResult<Option<Job>>;

    async fn get_by_key(&self, key: &str) -> StoreResult<Option<Job>>;

    /// Children of a job in execution order.
    async fn children(&self, parent_id: DbId) -> StoreResult<Vec<Job>>;

    /// Apply `update` only if the job is still in `expected` status.
    async fn update_if_status(
        &self,
        id: DbId,
        expected: JobStatus,
        update: &JobUpdate,
    ) -> StoreResult<Option<Job>>;

    /// Mark the job's callback as fired. Only the first caller gets `true`.
    async fn claim_callback(&self, id: DbId) -> StoreResult<bool>;
}

/// Persistence of zones, queues and workers.
#[async_trait]
pub trait FleetStore: Send + Sync {
    async fn get_or_create_zone(&self, account: &str, name: &str) -> StoreResult<Zone>;

    async fn get_or_create_queue(
        &self,
        zone_id: DbId,
        name: &str,
        spec: &QueueSpec,
    ) -> StoreResult<Queue>;

    async fn find_active_worker(&self, signature: &str) -> StoreResult<Option<Worker>>;

    async fn find_worker(&self, id: DbId) -> StoreResult<Option<Worker>>;

    async fn create_worker(&self, event: &WorkerEvent) -> StoreResult<Worker>;

    /// Finish any active worker with the event's signature and record a
    /// new one.
    async fn replace_worker(&self, event: &WorkerEvent) -> StoreResult<Worker>;

    async fn add_worker_queue(&self, worker_id: DbId, queue_id: DbId) -> StoreResult<()>;

    async fn worker_queue_ids(&self, worker_id: DbId) -> StoreResult<Vec<DbId>>;

    /// Refresh the worker's last-seen time and store a heartbeat sample.
    async fn record_heartbeat(
        &self,
        worker_id: DbId,
        event: &WorkerEvent,
    ) -> StoreResult<WorkerHeartbeat>;

    async fn finish_worker(&self, worker_id: DbId) -> StoreResult<Option<Worker>>;

    /// Queues in the zones of `accounts`, with counts of workers live
    /// since `live_since`.
    async fn queue_candidates(
        &self,
        accounts: &[String],
        live_since: Timestamp,
    ) -> StoreResult<Vec<QueueCandidate>>;
}
