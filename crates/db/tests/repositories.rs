//! Repository tests against a real PostgreSQL database.
//!
//! Run with `DATABASE_URL` pointing at a server where the test user may
//! create databases, then `cargo test -p jobhub-db -- --ignored`.

use chrono::{Duration, Utc};
use jobhub_core::callbacks::{CallbackTarget, JobCallback, ReviewExtraction};
use jobhub_core::fleet::{parse_queue_name, WorkerEvent};
use jobhub_core::jobs::{JobMethod, LogEntry};
use jobhub_core::status::JobStatus;
use jobhub_db::models::job::{JobUpdate, NewJob};
use jobhub_db::repositories::{FleetRepo, JobRepo, ReviewRepo};
use sqlx::PgPool;

fn worker_event(hostname: &str) -> WorkerEvent {
    WorkerEvent {
        hostname: hostname.into(),
        pid: Some(1),
        freq: Some(2.0),
        ..Default::default()
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_bootstrap(pool: PgPool) {
    jobhub_db::health_check(&pool).await.unwrap();
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_statuses")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 9);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_update_is_compare_and_set(pool: PgPool) {
    let input = NewJob::new(JobMethod::Sleep).with_params(serde_json::json!({"seconds": 1}));
    let job = JobRepo::insert(&pool, &input, "k1", None, 0).await.unwrap();
    assert_eq!(job.status(), JobStatus::Waiting);

    let update = JobUpdate {
        log: Some(vec![LogEntry::info("sent")]),
        ..JobUpdate::status(JobStatus::Dispatched)
    };
    let updated = JobRepo::update_if_status(&pool, job.id, JobStatus::Waiting, &update)
        .await
        .unwrap()
        .expect("first write wins");
    assert_eq!(updated.status(), JobStatus::Dispatched);
    assert_eq!(updated.log.0.len(), 1);

    let stale = JobRepo::update_if_status(&pool, job.id, JobStatus::Waiting, &update)
        .await
        .unwrap();
    assert!(stale.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_children_are_ordered(pool: PgPool) {
    let parent = JobRepo::insert(&pool, &NewJob::new(JobMethod::Chain), "p", None, 0)
        .await
        .unwrap();
    for (position, key) in [(1, "c1"), (0, "c0")] {
        JobRepo::insert(&pool, &NewJob::new(JobMethod::Pull), key, Some(parent.id), position)
            .await
            .unwrap();
    }
    let children = JobRepo::list_children(&pool, parent.id).await.unwrap();
    let positions: Vec<i32> = children.iter().map(|c| c.position).collect();
    assert_eq!(positions, vec![0, 1]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_callback_claimed_once(pool: PgPool) {
    let review = ReviewRepo::create(&pool, 1).await.unwrap();
    let input = NewJob::new(JobMethod::Extract)
        .with_callback(JobCallback::new(CallbackTarget::Review, review.id));
    let job = JobRepo::insert(&pool, &input, "k2", None, 0).await.unwrap();
    assert_eq!(
        job.callback().unwrap(),
        Some(JobCallback::new(CallbackTarget::Review, review.id))
    );

    assert!(JobRepo::claim_callback(&pool, job.id).await.unwrap());
    assert!(!JobRepo::claim_callback(&pool, job.id).await.unwrap());

    let stored = ReviewRepo::record_extraction(&pool, review.id, job.id, &ReviewExtraction::Failed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, "FAILED");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_queue_candidates_count_live_workers(pool: PgPool) {
    let spec = parse_queue_name("default:2").unwrap();
    let zone = FleetRepo::get_or_create_zone(&pool, "stencila", &spec.zone).await.unwrap();
    let again = FleetRepo::get_or_create_zone(&pool, "stencila", &spec.zone).await.unwrap();
    assert_eq!(zone.id, again.id);

    let queue = FleetRepo::get_or_create_queue(&pool, zone.id, "default:2", &spec)
        .await
        .unwrap();
    let worker = FleetRepo::replace_worker(&pool, &worker_event("w1")).await.unwrap();
    FleetRepo::add_worker_queue(&pool, worker.id, queue.id).await.unwrap();

    let since = Utc::now() - Duration::minutes(15);
    let accounts = vec!["stencila".to_string()];
    let candidates = FleetRepo::queue_candidates(&pool, &accounts, since).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].priority, 2);
    assert_eq!(candidates[0].live_workers, 1);

    FleetRepo::finish_worker(&pool, worker.id).await.unwrap();
    let candidates = FleetRepo::queue_candidates(&pool, &accounts, since).await.unwrap();
    assert_eq!(candidates[0].live_workers, 0);
}
