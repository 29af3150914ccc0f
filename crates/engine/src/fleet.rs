//! Fleet registry: records workers and their queues from the broker's
//! worker events.
//!
//! | Event       | Effect                                                     |
//! |-------------|------------------------------------------------------------|
//! | `online`    | Replace any active worker with the same signature; create the zones and queues it listens on |
//! | `heartbeat` | Refresh the worker's last-seen time; store a sample        |
//! | `offline`   | Mark the worker finished                                   |

use std::sync::Arc;

use jobhub_core::fleet::{parse_queue_name, WorkerEvent};
use jobhub_db::models::fleet::{Queue, Worker, WorkerHeartbeat};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::store::FleetStore;

pub struct FleetRegistry {
    fleet: Arc<dyn FleetStore>,
    config: EngineConfig,
}

impl FleetRegistry {
    pub fn new(fleet: Arc<dyn FleetStore>, config: EngineConfig) -> Self {
        Self { fleet, config }
    }

    /// A worker came online. Returns the new worker record and the queues
    /// it was linked to.
    ///
    /// Queue names that do not follow the naming grammar are skipped with
    /// a warning.
    pub async fn worker_online(&self, event: &WorkerEvent) -> EngineResult<(Worker, Vec<Queue>)> {
        let worker = self.fleet.replace_worker(event).await?;
        let account = event
            .account()
            .unwrap_or(&self.config.default_zone_account)
            .to_string();

        let mut queues = Vec::new();
        for name in event.queue_names() {
            let spec = match parse_queue_name(&name) {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::warn!(worker_id = worker.id, queue = %name, error = %e, "Skipping queue");
                    continue;
                }
            };
            let zone = self.fleet.get_or_create_zone(&account, &spec.zone).await?;
            let queue = self.fleet.get_or_create_queue(zone.id, &name, &spec).await?;
            self.fleet.add_worker_queue(worker.id, queue.id).await?;
            queues.push(queue);
        }

        if queues.is_empty() {
            tracing::warn!(worker_id = worker.id, hostname = %worker.hostname, "Worker listens on no queues");
        }
        tracing::info!(
            worker_id = worker.id,
            hostname = %worker.hostname,
            account = %account,
            queues = queues.len(),
            "Worker online",
        );
        Ok((worker, queues))
    }

    /// A worker reported a heartbeat. A worker never seen online is
    /// recorded first.
    pub async fn worker_heartbeat(&self, event: &WorkerEvent) -> EngineResult<WorkerHeartbeat> {
        let worker = self.active_or_create(event).await?;
        let heartbeat = self.fleet.record_heartbeat(worker.id, event).await?;
        tracing::debug!(worker_id = worker.id, active = heartbeat.active, "Worker heartbeat");
        Ok(heartbeat)
    }

    /// A worker went offline.
    pub async fn worker_offline(&self, event: &WorkerEvent) -> EngineResult<Worker> {
        let worker = self.active_or_create(event).await?;
        let finished = self.fleet.finish_worker(worker.id).await?.unwrap_or(worker);
        tracing::info!(worker_id = finished.id, hostname = %finished.hostname, "Worker offline");
        Ok(finished)
    }

    async fn active_or_create(&self, event: &WorkerEvent) -> EngineResult<Worker> {
        match self.fleet.find_active_worker(&event.signature()).await? {
            Some(worker) => Ok(worker),
            None => Ok(self.fleet.create_worker(event).await?),
        }
    }
}
