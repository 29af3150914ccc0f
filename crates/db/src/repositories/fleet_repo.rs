//! Repository for zones, queues, workers and heartbeats.

use jobhub_core::fleet::{QueueCandidate, QueueSpec, WorkerEvent};
use jobhub_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::fleet::{Queue, QueueCandidateRow, Worker, WorkerHeartbeat, Zone};

const ZONE_COLUMNS: &str = "id, account, name, created_at";

const QUEUE_COLUMNS: &str = "id, zone_id, name, priority, untrusted, interrupt, created_at";

const WORKER_COLUMNS: &str = "\
    id, hostname, utcoffset, pid, freq, software, os, details, signature, \
    started_at, updated_at, finished_at";

const HEARTBEAT_COLUMNS: &str = "id, worker_id, time, clock, active, processed, load";

/// Provides persistence operations for the worker fleet.
pub struct FleetRepo;

impl FleetRepo {
    // -- zones and queues ----------------------------------------------------

    pub async fn get_or_create_zone(
        pool: &PgPool,
        account: &str,
        name: &str,
    ) -> Result<Zone, sqlx::Error> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let query = format!(
            "INSERT INTO zones (account, name) VALUES ($1, $2) \
             ON CONFLICT ON CONSTRAINT uq_zones_account_name DO UPDATE SET name = EXCLUDED.name \
             RETURNING {ZONE_COLUMNS}"
        );
        sqlx::query_as::<_, Zone>(&query)
            .bind(account)
            .bind(name)
            .fetch_one(pool)
            .await
    }

    pub async fn get_or_create_queue(
        pool: &PgPool,
        zone_id: DbId,
        name: &str,
        spec: &QueueSpec,
    ) -> Result<Queue, sqlx::Error> {
        let query = format!(
            "INSERT INTO queues (zone_id, name, priority, untrusted, interrupt) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT ON CONSTRAINT uq_queues_zone_name DO UPDATE SET name = EXCLUDED.name \
             RETURNING {QUEUE_COLUMNS}"
        );
        sqlx::query_as::<_, Queue>(&query)
            .bind(zone_id)
            .bind(name)
            .bind(spec.priority)
            .bind(spec.untrusted)
            .bind(spec.interrupt)
            .fetch_one(pool)
            .await
    }

    pub async fn find_queue(pool: &PgPool, id: DbId) -> Result<Option<Queue>, sqlx::Error> {
        let query = format!("SELECT {QUEUE_COLUMNS} FROM queues WHERE id = $1");
        sqlx::query_as::<_, Queue>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Queues in the zones of `accounts`, each with its number of live
    /// workers (not finished, last seen at or after `live_since`).
    ///
    /// Ordered by priority descending then id ascending.
    pub async fn queue_candidates(
        pool: &PgPool,
        accounts: &[String],
        live_since: Timestamp,
    ) -> Result<Vec<QueueCandidate>, sqlx::Error> {
        let rows = sqlx::query_as::<_, QueueCandidateRow>(
            "SELECT q.id, q.name, q.zone_id, q.priority, \
                    COUNT(w.id) FILTER ( \
                        WHERE w.finished_at IS NULL \
                          AND COALESCE(w.updated_at, w.started_at) >= $2 \
                    ) AS live_workers \
             FROM queues q \
             JOIN zones z ON z.id = q.zone_id \
             LEFT JOIN worker_queues wq ON wq.queue_id = q.id \
             LEFT JOIN workers w ON w.id = wq.worker_id \
             WHERE z.account = ANY($1) \
             GROUP BY q.id \
             ORDER BY q.priority DESC, q.id ASC",
        )
        .bind(accounts)
        .bind(live_since)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(QueueCandidate::from).collect())
    }

    // -- workers -------------------------------------------------------------

    /// The unfinished worker with this signature, if any.
    pub async fn find_active_worker(
        pool: &PgPool,
        signature: &str,
    ) -> Result<Option<Worker>, sqlx::Error> {
        let query = format!(
            "SELECT {WORKER_COLUMNS} FROM workers WHERE signature = $1 AND finished_at IS NULL"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(signature)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_worker(pool: &PgPool, id: DbId) -> Result<Option<Worker>, sqlx::Error> {
        let query = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = $1");
        sqlx::query_as::<_, Worker>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Record a new worker from an event.
    pub async fn create_worker(pool: &PgPool, event: &WorkerEvent) -> Result<Worker, sqlx::Error> {
        Self::insert_worker(pool, event).await
    }

    /// Close any active worker with the same signature and record a new one.
    ///
    /// A worker coming online again under the same signature (e.g. after a
    /// missed offline event) replaces the stale record.
    pub async fn replace_worker(pool: &PgPool, event: &WorkerEvent) -> Result<Worker, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query(
            "UPDATE workers SET finished_at = NOW() WHERE signature = $1 AND finished_at IS NULL",
        )
        .bind(event.signature())
        .execute(&mut *tx)
        .await?;
        let worker = Self::insert_worker(&mut *tx, event).await?;
        tx.commit().await?;
        Ok(worker)
    }

    async fn insert_worker<'e, E>(executor: E, event: &WorkerEvent) -> Result<Worker, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let query = format!(
            "INSERT INTO workers (hostname, utcoffset, pid, freq, software, os, details, signature) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {WORKER_COLUMNS}"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(&event.hostname)
            .bind(event.utcoffset)
            .bind(event.pid)
            .bind(event.freq)
            .bind(event.software())
            .bind(event.os())
            .bind(&event.details)
            .bind(event.signature())
            .fetch_one(executor)
            .await
    }

    pub async fn add_worker_queue(
        pool: &PgPool,
        worker_id: DbId,
        queue_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO worker_queues (worker_id, queue_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(worker_id)
        .bind(queue_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Ids of the queues a worker listens on.
    pub async fn worker_queue_ids(pool: &PgPool, worker_id: DbId) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT queue_id FROM worker_queues WHERE worker_id = $1 ORDER BY queue_id",
        )
        .bind(worker_id)
        .fetch_all(pool)
        .await
    }

    /// Set `updated_at` to now and record a heartbeat sample.
    pub async fn record_heartbeat(
        pool: &PgPool,
        worker_id: DbId,
        event: &WorkerEvent,
    ) -> Result<WorkerHeartbeat, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("UPDATE workers SET updated_at = NOW() WHERE id = $1")
            .bind(worker_id)
            .execute(&mut *tx)
            .await?;
        let query = format!(
            "INSERT INTO worker_heartbeats (worker_id, clock, active, processed, load) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {HEARTBEAT_COLUMNS}"
        );
        let load = serde_json::to_value(event.loadavg.clone().unwrap_or_default())
            .unwrap_or(serde_json::Value::Array(Vec::new()));
        let heartbeat = sqlx::query_as::<_, WorkerHeartbeat>(&query)
            .bind(worker_id)
            .bind(event.clock.unwrap_or(0))
            .bind(event.active.unwrap_or(0))
            .bind(event.processed.unwrap_or(0))
            .bind(load)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(heartbeat)
    }

    pub async fn finish_worker(pool: &PgPool, worker_id: DbId) -> Result<Option<Worker>, sqlx::Error> {
        let query = format!(
            "UPDATE workers SET finished_at = COALESCE(finished_at, NOW()) WHERE id = $1 \
             RETURNING {WORKER_COLUMNS}"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(worker_id)
            .fetch_optional(pool)
            .await
    }

    /// Most recent heartbeats of a worker, newest first.
    pub async fn list_heartbeats(
        pool: &PgPool,
        worker_id: DbId,
        limit: i64,
    ) -> Result<Vec<WorkerHeartbeat>, sqlx::Error> {
        let query = format!(
            "SELECT {HEARTBEAT_COLUMNS} FROM worker_heartbeats WHERE worker_id = $1 \
             ORDER BY time DESC LIMIT $2"
        );
        sqlx::query_as::<_, WorkerHeartbeat>(&query)
            .bind(worker_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
