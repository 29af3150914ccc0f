#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jobhub_broker::MemoryBroker;
use jobhub_core::callbacks::CallbackTarget;
use jobhub_core::fleet::WorkerEvent;
use jobhub_core::types::DbId;
use jobhub_db::models::fleet::Worker;
use jobhub_db::models::job::Job;
use jobhub_engine::{
    CallbackRegistry, EngineConfig, EngineError, FleetRegistry, JobEngine, JobStore, MemoryStore,
    OnJobComplete,
};
use serde_json::json;

/// An engine over an in-memory store and broker.
pub struct TestEngine {
    pub engine: JobEngine,
    pub fleet: FleetRegistry,
    pub store: Arc<MemoryStore>,
    pub broker: Arc<MemoryBroker>,
    pub callbacks: Arc<RecordingCallback>,
}

pub fn build_engine() -> TestEngine {
    let store = Arc::new(MemoryStore::new());
    let broker = Arc::new(MemoryBroker::new());
    let callbacks = Arc::new(RecordingCallback::default());
    let config = EngineConfig::default();

    let registry = CallbackRegistry::new()
        .register(CallbackTarget::Snapshot, callbacks.clone())
        .register(CallbackTarget::Review, callbacks.clone());
    let engine = JobEngine::new(
        store.clone(),
        store.clone(),
        broker.clone(),
        registry,
        config.clone(),
    );
    let fleet = FleetRegistry::new(store.clone(), config);

    TestEngine {
        engine,
        fleet,
        store,
        broker,
        callbacks,
    }
}

impl TestEngine {
    /// Bring a worker online on `queues` under `account` (`None` for the
    /// default account).
    pub async fn worker(&self, hostname: &str, account: Option<&str>, queues: &[&str]) -> Worker {
        let (worker, _) = self
            .fleet
            .worker_online(&worker_event(hostname, account, queues))
            .await
            .unwrap();
        worker
    }

    /// A job as stored, without synchronizing it.
    pub async fn stored(&self, id: DbId) -> Job {
        self.store.get(id).await.unwrap().unwrap()
    }
}

pub fn worker_event(hostname: &str, account: Option<&str>, queues: &[&str]) -> WorkerEvent {
    let queues: Vec<_> = queues.iter().map(|name| json!({ "name": name })).collect();
    let vhost = account.unwrap_or("/");
    serde_json::from_value(json!({
        "hostname": hostname,
        "utcoffset": 0,
        "pid": 1,
        "freq": 2.0,
        "sw_ident": "py-celery",
        "sw_ver": "5.0.2",
        "sw_sys": "Linux",
        "details": {
            "stats": {"broker": {"virtual_host": vhost}},
            "queues": queues,
        },
    }))
    .unwrap()
}

/// Records every callback invocation.
#[derive(Default)]
pub struct RecordingCallback {
    pub calls: Mutex<Vec<(DbId, DbId)>>,
}

impl RecordingCallback {
    /// `(target_id, job_id)` pairs, in order.
    pub fn calls(&self) -> Vec<(DbId, DbId)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OnJobComplete for RecordingCallback {
    async fn on_job_complete(&self, target_id: DbId, job: &Job) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push((target_id, job.id));
        Ok(())
    }
}
