//! Zone, queue, worker and heartbeat models.

use jobhub_core::fleet::QueueCandidate;
use jobhub_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `zones` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Zone {
    pub id: DbId,
    pub account: String,
    pub name: String,
    pub created_at: Timestamp,
}

/// A row from the `queues` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Queue {
    pub id: DbId,
    pub zone_id: DbId,
    pub name: String,
    pub priority: i32,
    pub untrusted: bool,
    pub interrupt: bool,
    pub created_at: Timestamp,
}

/// A row from the `workers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Worker {
    pub id: DbId,
    pub hostname: String,
    pub utcoffset: Option<i32>,
    pub pid: Option<i32>,
    pub freq: Option<f64>,
    pub software: Option<String>,
    pub os: Option<String>,
    pub details: Option<serde_json::Value>,
    pub signature: String,
    pub started_at: Timestamp,
    /// Time of the last heartbeat.
    pub updated_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl Worker {
    /// Last sign of life: the latest heartbeat, or coming online.
    pub fn last_seen(&self) -> Timestamp {
        self.updated_at.unwrap_or(self.started_at)
    }
}

/// A row from the `worker_heartbeats` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkerHeartbeat {
    pub id: DbId,
    pub worker_id: DbId,
    pub time: Timestamp,
    pub clock: i64,
    pub active: i32,
    pub processed: i32,
    pub load: serde_json::Value,
}

/// A queue with its count of live workers, as read for dispatch.
#[derive(Debug, Clone, FromRow)]
pub struct QueueCandidateRow {
    pub id: DbId,
    pub name: String,
    pub zone_id: DbId,
    pub priority: i32,
    pub live_workers: i64,
}

impl From<QueueCandidateRow> for QueueCandidate {
    fn from(row: QueueCandidateRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            zone_id: row.zone_id,
            priority: row.priority,
            live_workers: row.live_workers,
        }
    }
}
