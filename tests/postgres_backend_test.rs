//! PostgreSQL backend tests. Skipped unless `DATABASE_URL` is set.

#![cfg(feature = "postgres")]

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tasker_batch::config::{BatchConfig, DatabaseConfig};
use tasker_batch::database::{
    DatabaseConnection, DatabaseMigrations, PgBatchRegistry, PgDeadLetterStore, PgJobQueue,
    PgProgressTracker,
};
use tasker_batch::messaging::{EnqueueOutcome, JobQueue};
use tasker_batch::dead_letter::DeadLetterStore;
use tasker_batch::models::{BatchSource, DeadLetterEntry, ProgressKind};
use tasker_batch::progress::ProgressTracker;
use tasker_batch::retry::{ErrorKindClassifier, RetryAllClassifier};
use tasker_batch::{BatchError, BatchService, PressureMonitor, ProcessingError};

struct PgEnvironment {
    config: BatchConfig,
    queue: Arc<PgJobQueue>,
    progress: Arc<PgProgressTracker>,
    dead_letters: Arc<PgDeadLetterStore>,
    service: BatchService,
}

async fn pg_environment() -> Option<PgEnvironment> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
        return None;
    }
    init_test_logging();

    let mut config = fast_config();
    config.queue.poll_timeout_ms = 50;
    config.queue.poll_interval_ms = 10;
    // isolate tests sharing one database
    config.queue.queue_name = format!("test_{}", uuid::Uuid::new_v4().simple());

    let connection = DatabaseConnection::connect(&DatabaseConfig::default())
        .await
        .expect("database should be reachable");
    DatabaseMigrations::run_all(connection.pool())
        .await
        .expect("migrations should apply");

    let pool = connection.pool().clone();
    let queue = Arc::new(PgJobQueue::new(pool.clone(), &config.queue));
    let progress = Arc::new(PgProgressTracker::new(
        pool.clone(),
        config.progress.error_sample_capacity,
    ));
    let dead_letters = Arc::new(PgDeadLetterStore::new(pool.clone()));
    let service = BatchService::new(
        config.clone(),
        queue.clone(),
        progress.clone(),
        dead_letters.clone(),
        Arc::new(PgBatchRegistry::new(pool)),
        Arc::new(PressureMonitor::new(config.pressure.clone())),
    )
    .expect("service should build");

    Some(PgEnvironment {
        config,
        queue,
        progress,
        dead_letters,
        service,
    })
}

#[tokio::test]
async fn test_pg_batch_runs_to_completion() {
    let Some(env) = pg_environment().await else {
        return;
    };
    let handler = Arc::new(RecordingHandler::new());
    let worker = env
        .service
        .worker_builder()
        .worker_id("pg-worker")
        .handler(handler.clone())
        .classifier(Arc::new(ErrorKindClassifier))
        .build()
        .unwrap()
        .start();

    let manifest = env
        .service
        .create_batch(BatchSource::count(10_000), Some(500), None)
        .await
        .unwrap();
    let status = env
        .service
        .wait_for_terminal(manifest.batch_id, WAIT_POLL, Duration::from_secs(30))
        .await
        .unwrap();
    worker.shutdown(Duration::from_secs(5)).await.unwrap();

    assert_eq!((status.total, status.succeeded, status.dead_lettered), (20, 20, 0));
    assert!(status.terminal);
    assert_eq!(handler.records_applied(), 10_000);
}

#[tokio::test]
async fn test_pg_permanent_failure_dead_letters_after_three_attempts() {
    let Some(env) = pg_environment().await else {
        return;
    };
    let handler = Arc::new(FailingHandler::always(
        vec![0],
        ProcessingError::permanent("malformed record"),
    ));
    let worker = env
        .service
        .worker_builder()
        .handler(handler.clone())
        .classifier(Arc::new(RetryAllClassifier))
        .build()
        .unwrap()
        .start();

    let manifest = env
        .service
        .create_batch(BatchSource::count(10), Some(10), Some(3))
        .await
        .unwrap();
    let status = env
        .service
        .wait_for_terminal(manifest.batch_id, WAIT_POLL, Duration::from_secs(30))
        .await
        .unwrap();
    worker.shutdown(Duration::from_secs(5)).await.unwrap();

    assert_eq!(status.dead_lettered, 1);
    assert_eq!(handler.total_attempts(), 3);
    let entries = env.service.list_dead_letters(manifest.batch_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attempts_made, 3);

    let replayed = env.service.requeue_dead_letter(entries[0].job_id).await.unwrap();
    assert_eq!(replayed.replay_generation, 1);
    let err = env
        .service
        .requeue_dead_letter(entries[0].job_id)
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::AlreadyReplayed { .. }));
}

#[tokio::test]
async fn test_pg_lease_semantics() {
    let Some(env) = pg_environment().await else {
        return;
    };
    let plan = env
        .service
        .plan_batch(&BatchSource::count(10), Some(10), None)
        .unwrap();
    let (manifest, jobs) = plan.into_parts();
    env.progress.create(&manifest).await.unwrap();

    assert_eq!(env.queue.enqueue(&jobs[0]).await.unwrap(), EnqueueOutcome::Enqueued);
    assert_eq!(env.queue.enqueue(&jobs[0]).await.unwrap(), EnqueueOutcome::Duplicate);

    let first = env
        .queue
        .dequeue(Duration::from_millis(200))
        .await
        .unwrap()
        .expect("job should be leased");
    assert!(env.queue.dequeue(Duration::from_millis(200)).await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let second = env
        .queue
        .dequeue(env.config.queue.lease_duration())
        .await
        .unwrap()
        .expect("expired lease should be redelivered");
    assert_eq!(second.job_id(), first.job_id());
    assert_eq!(second.job.attempt, 0);
    assert_eq!(second.lease.delivery_count, 2);

    let err = env.queue.ack(first.job_id(), &first.lease.token).await.unwrap_err();
    assert!(err.is_lease_expired());

    env.queue
        .nack(second.job_id(), &second.lease.token, Duration::from_millis(10))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let third = env
        .queue
        .dequeue(env.config.queue.lease_duration())
        .await
        .unwrap()
        .expect("nacked job should come back");
    assert_eq!(third.job.attempt, 1);
    env.queue.ack(third.job_id(), &third.lease.token).await.unwrap();

    let err = env.queue.ack(third.job_id(), &third.lease.token).await.unwrap_err();
    assert!(err.is_lease_expired());
}

#[tokio::test]
async fn test_pg_progress_counters_are_bounded() {
    let Some(env) = pg_environment().await else {
        return;
    };
    let plan = env
        .service
        .plan_batch(&BatchSource::count(20), Some(10), None)
        .unwrap();
    let (manifest, _) = plan.into_parts();
    env.progress.create(&manifest).await.unwrap();

    env.progress.increment(manifest.batch_id, ProgressKind::Failed).await.unwrap();
    env.progress
        .transfer(manifest.batch_id, ProgressKind::Failed, ProgressKind::Succeeded)
        .await
        .unwrap();
    env.progress.increment(manifest.batch_id, ProgressKind::DeadLettered).await.unwrap();
    assert!(env
        .progress
        .increment(manifest.batch_id, ProgressKind::Succeeded)
        .await
        .is_err());

    env.progress.archive(manifest.batch_id).await.unwrap();
    let snapshot = env.progress.snapshot(manifest.batch_id).await.unwrap();
    assert!(snapshot.is_terminal());
    assert!(snapshot.archived_at.is_some());

    assert_eq!(
        env.progress
            .decrement(manifest.batch_id, ProgressKind::DeadLettered)
            .await
            .unwrap(),
        0
    );
    let snapshot = env.progress.snapshot(manifest.batch_id).await.unwrap();
    assert!(snapshot.archived_at.is_none());

    let err = env
        .progress
        .decrement(manifest.batch_id, ProgressKind::DeadLettered)
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::StateTransition { .. }));
}

#[tokio::test]
async fn test_pg_dead_letters_keep_every_generation() {
    let Some(env) = pg_environment().await else {
        return;
    };
    let plan = env
        .service
        .plan_batch(&BatchSource::count(10), Some(10), None)
        .unwrap();
    let (_, jobs) = plan.into_parts();
    let job = &jobs[0];

    let first = DeadLetterEntry::new(job, "bad row", true).with_lease_token("lease-a");
    assert!(env.dead_letters.append(first).await.unwrap());
    // a redelivery of the same generation takes the entry over
    let duplicate = DeadLetterEntry::new(job, "bad row", true).with_lease_token("lease-b");
    assert!(!env.dead_letters.append(duplicate).await.unwrap());
    assert!(!env.dead_letters.retract(job.job_id, 0, Some("lease-a")).await.unwrap());

    env.dead_letters.mark_replayed(job.job_id).await.unwrap();
    let replayed = job.for_replay();
    let second = DeadLetterEntry::new(&replayed, "still bad", true).with_lease_token("lease-c");
    assert!(env.dead_letters.append(second).await.unwrap());

    let latest = env.dead_letters.get(job.job_id).await.unwrap().unwrap();
    assert_eq!(latest.replay_generation(), 1);
    let history = env.dead_letters.history(job.job_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].replay_generation(), 0);
    assert!(history[0].replayed_at.is_some());

    // replayed entries are history, not open outcomes
    assert!(!env.dead_letters.retract(job.job_id, 0, None).await.unwrap());
    assert!(env.dead_letters.retract(job.job_id, 1, Some("lease-c")).await.unwrap());
    assert_eq!(env.dead_letters.history(job.job_id).await.unwrap().len(), 1);
}
