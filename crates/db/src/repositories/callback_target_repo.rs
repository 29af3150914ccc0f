//! Repositories for snapshots, DOIs and reviews: the objects a job can
//! notify on completion.

use jobhub_core::callbacks::{DoiRegistration, ReviewExtraction, SnapshotFile};
use jobhub_core::types::DbId;
use sqlx::PgPool;

use crate::models::callback_target::{review_status, Doi, File, Review, Snapshot};

const SNAPSHOT_COLUMNS: &str = "id, project_id, job_id, path, created_at";

const FILE_COLUMNS: &str = "\
    id, project_id, snapshot_id, job_id, path, modified_at, size, mimetype, encoding, created_at";

const DOI_COLUMNS: &str = "\
    id, doi, url, job_id, deposited_at, registered_at, request, response, created_at, updated_at";

const REVIEW_COLUMNS: &str = "\
    id, project_id, job_id, status, review, review_date, review_comments, created_at, updated_at";

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

pub struct SnapshotRepo;

impl SnapshotRepo {
    pub async fn create(
        pool: &PgPool,
        project_id: DbId,
        job_id: Option<DbId>,
    ) -> Result<Snapshot, sqlx::Error> {
        let query = format!(
            "INSERT INTO snapshots (project_id, job_id) VALUES ($1, $2) RETURNING {SNAPSHOT_COLUMNS}"
        );
        sqlx::query_as::<_, Snapshot>(&query)
            .bind(project_id)
            .bind(job_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Snapshot>, sqlx::Error> {
        let query = format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = $1");
        sqlx::query_as::<_, Snapshot>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Record the files a job produced for a snapshot, in one transaction.
    pub async fn add_files(
        pool: &PgPool,
        snapshot: &Snapshot,
        job_id: DbId,
        files: &[SnapshotFile],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut inserted = 0;
        for file in files {
            let result = sqlx::query(
                "INSERT INTO files \
                    (project_id, snapshot_id, job_id, path, modified_at, size, mimetype, encoding) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(snapshot.project_id)
            .bind(snapshot.id)
            .bind(job_id)
            .bind(&file.path)
            .bind(file.modified)
            .bind(file.size)
            .bind(&file.mimetype)
            .bind(&file.encoding)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn list_files(pool: &PgPool, snapshot_id: DbId) -> Result<Vec<File>, sqlx::Error> {
        let query =
            format!("SELECT {FILE_COLUMNS} FROM files WHERE snapshot_id = $1 ORDER BY path ASC");
        sqlx::query_as::<_, File>(&query)
            .bind(snapshot_id)
            .fetch_all(pool)
            .await
    }
}

// ---------------------------------------------------------------------------
// DOIs
// ---------------------------------------------------------------------------

pub struct DoiRepo;

impl DoiRepo {
    pub async fn create(pool: &PgPool, doi: Option<&str>, url: Option<&str>) -> Result<Doi, sqlx::Error> {
        let query = format!("INSERT INTO dois (doi, url) VALUES ($1, $2) RETURNING {DOI_COLUMNS}");
        sqlx::query_as::<_, Doi>(&query)
            .bind(doi)
            .bind(url)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Doi>, sqlx::Error> {
        let query = format!("SELECT {DOI_COLUMNS} FROM dois WHERE id = $1");
        sqlx::query_as::<_, Doi>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Store the registrar deposit details from a `register` job.
    pub async fn record_registration(
        pool: &PgPool,
        id: DbId,
        job_id: DbId,
        registration: &DoiRegistration,
    ) -> Result<Option<Doi>, sqlx::Error> {
        let query = format!(
            "UPDATE dois SET job_id = $2, deposited_at = $3, registered_at = $4, \
                request = $5, response = $6, updated_at = NOW() \
             WHERE id = $1 RETURNING {DOI_COLUMNS}"
        );
        sqlx::query_as::<_, Doi>(&query)
            .bind(id)
            .bind(job_id)
            .bind(registration.deposited)
            .bind(registration.registered)
            .bind(&registration.request)
            .bind(&registration.response)
            .fetch_optional(pool)
            .await
    }
}

// ---------------------------------------------------------------------------
// Reviews
// ---------------------------------------------------------------------------

pub struct ReviewRepo;

impl ReviewRepo {
    pub async fn create(pool: &PgPool, project_id: DbId) -> Result<Review, sqlx::Error> {
        let query = format!(
            "INSERT INTO reviews (project_id, status) VALUES ($1, $2) RETURNING {REVIEW_COLUMNS}"
        );
        sqlx::query_as::<_, Review>(&query)
            .bind(project_id)
            .bind(review_status::PENDING)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Review>, sqlx::Error> {
        let query = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        sqlx::query_as::<_, Review>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Store the outcome of an `extract` job.
    pub async fn record_extraction(
        pool: &PgPool,
        id: DbId,
        job_id: DbId,
        extraction: &ReviewExtraction,
    ) -> Result<Option<Review>, sqlx::Error> {
        let query = match extraction {
            ReviewExtraction::Failed => format!(
                "UPDATE reviews SET job_id = $2, status = $3, updated_at = NOW() \
                 WHERE id = $1 RETURNING {REVIEW_COLUMNS}"
            ),
            ReviewExtraction::Extracted { .. } => format!(
                "UPDATE reviews SET job_id = $2, status = $3, review = $4, review_date = $5, \
                    review_comments = $6, updated_at = NOW() \
                 WHERE id = $1 RETURNING {REVIEW_COLUMNS}"
            ),
        };
        let q = sqlx::query_as::<_, Review>(&query).bind(id).bind(job_id);
        let q = match extraction {
            ReviewExtraction::Failed => q.bind(review_status::FAILED),
            ReviewExtraction::Extracted {
                review,
                review_date,
                comments,
            } => q
                .bind(review_status::EXTRACTED)
                .bind(review)
                .bind(*review_date)
                .bind(*comments),
        };
        q.fetch_optional(pool).await
    }
}
