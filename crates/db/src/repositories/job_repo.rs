//! Repository for the `jobs` table.
//!
//! Status changes are compare-and-set on `status_id` so that concurrent
//! writers (the dispatcher, a synchronizing read, a cancellation) never
//! overwrite each other's transitions.

use jobhub_core::status::JobStatus;
use jobhub_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::job::{Job, JobUpdate, NewJob};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, key, method, params, project_id, account, description, \
    creator_id, users, anon_users, zone_id, queue_id, status_id, \
    parent_id, position, began_at, ended_at, result, error, log, \
    url, worker, retries, callback_type, callback_id, callback_method, \
    callback_fired_at, created_at, updated_at";

/// Provides persistence operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a single job in `WAITING`. Children of `input` are not
    /// inserted; callers walk the tree and pass `parent_id`/`position`.
    pub async fn insert(
        pool: &PgPool,
        input: &NewJob,
        key: &str,
        parent_id: Option<DbId>,
        position: i32,
    ) -> Result<Job, sqlx::Error> {
        let users: Vec<DbId> = input.creator_id.into_iter().collect();
        let query = format!(
            "INSERT INTO jobs \
                (key, method, params, project_id, account, description, creator_id, users, \
                 status_id, parent_id, position, callback_type, callback_id, callback_method) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(key)
            .bind(input.method.as_str())
            .bind(&input.params)
            .bind(input.project_id)
            .bind(&input.account)
            .bind(&input.description)
            .bind(input.creator_id)
            .bind(&users)
            .bind(JobStatus::Waiting.id())
            .bind(parent_id)
            .bind(position)
            .bind(input.callback.map(|c| c.target.as_str()))
            .bind(input.callback.map(|c| c.id))
            .bind(input.callback.map(|c| c.method_name()))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_key(pool: &PgPool, key: &str) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE key = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Children of a job in execution order.
    pub async fn list_children(pool: &PgPool, parent_id: DbId) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE parent_id = $1 ORDER BY position ASC, id ASC"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(parent_id)
            .fetch_all(pool)
            .await
    }

    /// Apply `update` if the job is still in `expected` status.
    ///
    /// Returns `None` when the job does not exist or its status has moved
    /// on since it was read.
    pub async fn update_if_status(
        pool: &PgPool,
        id: DbId,
        expected: JobStatus,
        update: &JobUpdate,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET \
                status_id = COALESCE($3, status_id), \
                zone_id = COALESCE($4, zone_id), \
                queue_id = COALESCE($5, queue_id), \
                began_at = COALESCE($6, began_at), \
                ended_at = COALESCE($7, ended_at), \
                result = COALESCE($8, result), \
                error = COALESCE($9, error), \
                log = COALESCE($10, log), \
                url = COALESCE($11, url), \
                worker = COALESCE($12, worker), \
                retries = COALESCE($13, retries), \
                updated_at = NOW() \
             WHERE id = $1 AND status_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(expected.id())
            .bind(update.status.map(JobStatus::id))
            .bind(update.zone_id)
            .bind(update.queue_id)
            .bind(update.began_at)
            .bind(update.ended_at)
            .bind(&update.result)
            .bind(update.error.as_ref().map(Json))
            .bind(update.log.as_ref().map(Json))
            .bind(&update.url)
            .bind(&update.worker)
            .bind(update.retries)
            .fetch_optional(pool)
            .await
    }

    /// Set `callback_fired_at` unless it is already set.
    ///
    /// Returns `true` only for the single caller that set it.
    pub async fn claim_callback(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET callback_fired_at = NOW() \
             WHERE id = $1 AND callback_type IS NOT NULL AND callback_fired_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
