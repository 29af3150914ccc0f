//! In-process store for tests and local development.
//!
//! Mirrors the semantics of the SQL repositories: compare-and-set status
//! updates, `COALESCE`-style partial updates, a single callback claim and
//! get-or-create zones and queues.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use jobhub_core::fleet::{is_worker_live, QueueCandidate, QueueSpec, WorkerEvent};
use jobhub_core::status::JobStatus;
use jobhub_core::types::{DbId, Timestamp};
use jobhub_db::models::fleet::{Queue, Worker, WorkerHeartbeat, Zone};
use jobhub_db::models::job::{Job, JobUpdate, NewJob};
use sqlx::types::Json;

use super::{FleetStore, JobStore, StoreResult};

#[derive(Default)]
struct Inner {
    next_id: DbId,
    jobs: BTreeMap<DbId, Job>,
    zones: Vec<Zone>,
    queues: Vec<Queue>,
    workers: Vec<Worker>,
    worker_queues: Vec<(DbId, DbId)>,
    heartbeats: Vec<WorkerHeartbeat>,
}

impl Inner {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn insert_worker(&mut self, event: &WorkerEvent) -> Worker {
        let worker = Worker {
            id: self.next_id(),
            hostname: event.hostname.clone(),
            utcoffset: event.utcoffset,
            pid: event.pid,
            freq: event.freq,
            software: Some(event.software()),
            os: Some(event.os()),
            details: event.details.clone(),
            signature: event.signature(),
            started_at: Utc::now(),
            updated_at: None,
            finished_at: None,
        };
        self.workers.push(worker.clone());
        worker
    }
}

/// Store keeping all rows in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Override a worker's last sign of life, e.g. to make it stale.
    pub fn set_worker_last_seen(&self, worker_id: DbId, seen: Timestamp) {
        let mut inner = self.lock();
        if let Some(worker) = inner.workers.iter_mut().find(|w| w.id == worker_id) {
            worker.started_at = worker.started_at.min(seen);
            worker.updated_at = Some(seen);
        }
    }

    /// All heartbeats recorded for a worker, oldest first.
    pub fn heartbeats(&self, worker_id: DbId) -> Vec<WorkerHeartbeat> {
        self.lock()
            .heartbeats
            .iter()
            .filter(|h| h.worker_id == worker_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert(
        &self,
        input: &NewJob,
        key: &str,
        parent_id: Option<DbId>,
        position: i32,
    ) -> StoreResult<Job> {
        let mut inner = self.lock();
        let now = Utc::now();
        let job = Job {
            id: inner.next_id(),
            key: key.to_string(),
            method: input.method.as_str().to_string(),
            params: input.params.clone(),
            project_id: input.project_id,
            account: input.account.clone(),
            description: input.description.clone(),
            creator_id: input.creator_id,
            users: input.creator_id.into_iter().collect(),
            anon_users: Vec::new(),
            zone_id: None,
            queue_id: None,
            status_id: JobStatus::Waiting.id(),
            parent_id,
            position,
            began_at: None,
            ended_at: None,
            result: None,
            error: None,
            log: Json(Vec::new()),
            url: None,
            worker: None,
            retries: None,
            callback_type: input.callback.map(|c| c.target.as_str().to_string()),
            callback_id: input.callback.map(|c| c.id),
            callback_method: input.callback.map(|c| c.method_name().to_string()),
            callback_fired_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: DbId) -> StoreResult<Option<Job>> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    async fn get_by_key(&self, key: &str) -> StoreResult<Option<Job>> {
        Ok(self.lock().jobs.values().find(|j| j.key == key).cloned())
    }

    async fn children(&self, parent_id: DbId) -> StoreResult<Vec<Job>> {
        let mut children: Vec<Job> = self
            .lock()
            .jobs
            .values()
            .filter(|j| j.parent_id == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by_key(|j| (j.position, j.id));
        Ok(children)
    }

    async fn update_if_status(
        &self,
        id: DbId,
        expected: JobStatus,
        update: &JobUpdate,
    ) -> StoreResult<Option<Job>> {
        let mut inner = self.lock();
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(None);
        };
        if job.status_id != expected.id() {
            return Ok(None);
        }

        if let Some(status) = update.status {
            job.status_id = status.id();
        }
        if update.zone_id.is_some() {
            job.zone_id = update.zone_id;
        }
        if update.queue_id.is_some() {
            job.queue_id = update.queue_id;
        }
        if update.began_at.is_some() {
            job.began_at = update.began_at;
        }
        if update.ended_at.is_some() {
            job.ended_at = update.ended_at;
        }
        if update.result.is_some() {
            job.result = update.result.clone();
        }
        if let Some(error) = &update.error {
            job.error = Some(Json(error.clone()));
        }
        if let Some(log) = &update.log {
            job.log = Json(log.clone());
        }
        if update.url.is_some() {
            job.url = update.url.clone();
        }
        if update.worker.is_some() {
            job.worker = update.worker.clone();
        }
        if update.retries.is_some() {
            job.retries = update.retries;
        }
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn claim_callback(&self, id: DbId) -> StoreResult<bool> {
        let mut inner = self.lock();
        match inner.jobs.get_mut(&id) {
            Some(job) if job.callback_type.is_some() && job.callback_fired_at.is_none() => {
                job.callback_fired_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl FleetStore for MemoryStore {
    async fn get_or_create_zone(&self, account: &str, name: &str) -> StoreResult<Zone> {
        let mut inner = self.lock();
        if let Some(zone) = inner
            .zones
            .iter()
            .find(|z| z.account == account && z.name == name)
        {
            return Ok(zone.clone());
        }
        let zone = Zone {
            id: inner.next_id(),
            account: account.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        inner.zones.push(zone.clone());
        Ok(zone)
    }

    async fn get_or_create_queue(
        &self,
        zone_id: DbId,
        name: &str,
        spec: &QueueSpec,
    ) -> StoreResult<Queue> {
        let mut inner = self.lock();
        if let Some(queue) = inner
            .queues
            .iter()
            .find(|q| q.zone_id == zone_id && q.name == name)
        {
            return Ok(queue.clone());
        }
        let queue = Queue {
            id: inner.next_id(),
            zone_id,
            name: name.to_string(),
            priority: spec.priority,
            untrusted: spec.untrusted,
            interrupt: spec.interrupt,
            created_at: Utc::now(),
        };
        inner.queues.push(queue.clone());
        Ok(queue)
    }

    async fn find_active_worker(&self, signature: &str) -> StoreResult<Option<Worker>> {
        Ok(self
            .lock()
            .workers
            .iter()
            .find(|w| w.signature == signature && w.finished_at.is_none())
            .cloned())
    }

    async fn find_worker(&self, id: DbId) -> StoreResult<Option<Worker>> {
        Ok(self.lock().workers.iter().find(|w| w.id == id).cloned())
    }

    async fn create_worker(&self, event: &WorkerEvent) -> StoreResult<Worker> {
        Ok(self.lock().insert_worker(event))
    }

    async fn replace_worker(&self, event: &WorkerEvent) -> StoreResult<Worker> {
        let mut inner = self.lock();
        let signature = event.signature();
        let now = Utc::now();
        for worker in inner
            .workers
            .iter_mut()
            .filter(|w| w.signature == signature && w.finished_at.is_none())
        {
            worker.finished_at = Some(now);
        }
        Ok(inner.insert_worker(event))
    }

    async fn add_worker_queue(&self, worker_id: DbId, queue_id: DbId) -> StoreResult<()> {
        let mut inner = self.lock();
        if !inner.worker_queues.contains(&(worker_id, queue_id)) {
            inner.worker_queues.push((worker_id, queue_id));
        }
        Ok(())
    }

    async fn worker_queue_ids(&self, worker_id: DbId) -> StoreResult<Vec<DbId>> {
        let mut ids: Vec<DbId> = self
            .lock()
            .worker_queues
            .iter()
            .filter(|(w, _)| *w == worker_id)
            .map(|(_, q)| *q)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn record_heartbeat(
        &self,
        worker_id: DbId,
        event: &WorkerEvent,
    ) -> StoreResult<WorkerHeartbeat> {
        let mut inner = self.lock();
        let now = Utc::now();
        if let Some(worker) = inner.workers.iter_mut().find(|w| w.id == worker_id) {
            worker.updated_at = Some(now);
        }
        let heartbeat = WorkerHeartbeat {
            id: inner.next_id(),
            worker_id,
            time: now,
            clock: event.clock.unwrap_or(0),
            active: event.active.unwrap_or(0),
            processed: event.processed.unwrap_or(0),
            load: serde_json::json!(event.loadavg.clone().unwrap_or_default()),
        };
        inner.heartbeats.push(heartbeat.clone());
        Ok(heartbeat)
    }

    async fn finish_worker(&self, worker_id: DbId) -> StoreResult<Option<Worker>> {
        let mut inner = self.lock();
        Ok(inner
            .workers
            .iter_mut()
            .find(|w| w.id == worker_id)
            .map(|worker| {
                worker.finished_at.get_or_insert_with(Utc::now);
                worker.clone()
            }))
    }

    async fn queue_candidates(
        &self,
        accounts: &[String],
        live_since: Timestamp,
    ) -> StoreResult<Vec<QueueCandidate>> {
        let inner = self.lock();
        let mut candidates: Vec<QueueCandidate> = inner
            .queues
            .iter()
            .filter(|q| {
                inner
                    .zones
                    .iter()
                    .any(|z| z.id == q.zone_id && accounts.contains(&z.account))
            })
            .map(|q| {
                let live_workers = inner
                    .worker_queues
                    .iter()
                    .filter(|(_, queue_id)| *queue_id == q.id)
                    .filter_map(|(worker_id, _)| inner.workers.iter().find(|w| w.id == *worker_id))
                    .filter(|w| is_worker_live(w.finished_at, Some(w.last_seen()), live_since))
                    .count() as i64;
                QueueCandidate {
                    id: q.id,
                    name: q.name.clone(),
                    zone_id: q.zone_id,
                    priority: q.priority,
                    live_workers,
                }
            })
            .collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(candidates)
    }
}
