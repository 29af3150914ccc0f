use async_trait::async_trait;
use jobhub_core::fleet::{QueueCandidate, QueueSpec, WorkerEvent};
use jobhub_core::status::JobStatus;
use jobhub_core::types::{DbId, Timestamp};
use jobhub_db::models::fleet::{Queue, Worker, WorkerHeartbeat, Zone};
use jobhub_db::models::job::{Job, JobUpdate, NewJob};
use jobhub_db::repositories::{FleetRepo, JobRepo};
use jobhub_db::DbPool;

use super::{FleetStore, JobStore, StoreResult};

/// Store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn insert(
        &self,
        input: &NewJob,
        key: &str,
        parent_id: Option<DbId>,
        position: i32,
    ) -> StoreResult<Job> {
        Ok(JobRepo::insert(&self.pool, input, key, parent_id, position).await?)
    }

    async fn get(&self, id: DbId) -> StoreResult<Option<Job>> {
        Ok(JobRepo::find_by_id(&self.pool, id).await?)
    }

    async fn get_by_key(&self, key: &str) -> StoreResult<Option<Job>> {
        Ok(JobRepo::find_by_key(&self.pool, key).await?)
    }

    async fn children(&self, parent_id: DbId) -> StoreResult<Vec<Job>> {
        Ok(JobRepo::list_children(&self.pool, parent_id).await?)
    }

    async fn update_if_status(
        &self,
        id: DbId,
        expected: JobStatus,
        update: &JobUpdate,
    ) -> StoreResult<Option<Job>> {
        Ok(JobRepo::update_if_status(&self.pool, id, expected, update).await?)
    }

    async fn claim_callback(&self, id: DbId) -> StoreResult<bool> {
        Ok(JobRepo::claim_callback(&self.pool, id).await?)
    }
}

#[async_trait]
impl FleetStore for PgStore {
    async fn get_or_create_zone(&self, account: &str, name: &str) -> StoreResult<Zone> {
        Ok(FleetRepo::get_or_create_zone(&self.pool, account, name).await?)
    }

    async fn get_or_create_queue(
        &self,
        zone_id: DbId,
        name: &str,
        spec: &QueueSpec,
    ) -> StoreResult<Queue> {
        Ok(FleetRepo::get_or_create_queue(&self.pool, zone_id, name, spec).await?)
    }

    async fn find_active_worker(&self, signature: &str) -> StoreResult<Option<Worker>> {
        Ok(FleetRepo::find_active_worker(&self.pool, signature).await?)
    }

    async fn find_worker(&self, id: DbId) -> StoreResult<Option<Worker>> {
        Ok(FleetRepo::find_worker(&self.pool, id).await?)
    }

    async fn create_worker(&self, event: &WorkerEvent) -> StoreResult<Worker> {
        Ok(FleetRepo::create_worker(&self.pool, event).await?)
    }

    async fn replace_worker(&self, event: &WorkerEvent) -> StoreResult<Worker> {
        Ok(FleetRepo::replace_worker(&self.pool, event).await?)
    }

    async fn add_worker_queue(&self, worker_id: DbId, queue_id: DbId) -> StoreResult<()> {
        Ok(FleetRepo::add_worker_queue(&self.pool, worker_id, queue_id).await?)
    }

    async fn worker_queue_ids(&self, worker_id: DbId) -> StoreResult<Vec<DbId>> {
        Ok(FleetRepo::worker_queue_ids(&self.pool, worker_id).await?)
    }

    async fn record_heartbeat(
        &self,
        worker_id: DbId,
        event: &WorkerEvent,
    ) -> StoreResult<WorkerHeartbeat> {
        Ok(FleetRepo::record_heartbeat(&self.pool, worker_id, event).await?)
    }

    async fn finish_worker(&self, worker_id: DbId) -> StoreResult<Option<Worker>> {
        Ok(FleetRepo::finish_worker(&self.pool, worker_id).await?)
    }

    async fn queue_candidates(
        &self,
        accounts: &[String],
        live_since: Timestamp,
    ) -> StoreResult<Vec<QueueCandidate>> {
        Ok(FleetRepo::queue_candidates(&self.pool, accounts, live_since).await?)
    }
}
