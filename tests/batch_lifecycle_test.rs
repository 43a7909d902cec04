//! End-to-end batch lifecycle against the in-memory backends

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tasker_batch::models::{BatchSource, ProgressKind};
use tasker_batch::progress::ProgressTracker;
use tasker_batch::retry::{ErrorKindClassifier, RetryAllClassifier};
use tasker_batch::ProcessingError;

#[tokio::test]
async fn test_all_chunks_succeed() {
    init_test_logging();
    let env = TestEnvironment::fast();
    let handler = Arc::new(RecordingHandler::new());
    let worker = env.start_worker("lifecycle-1", handler.clone(), Arc::new(ErrorKindClassifier));

    let manifest = env
        .service
        .create_batch(BatchSource::count(10_000), Some(500), None)
        .await
        .unwrap();
    assert_eq!(manifest.job_count, 20);

    let status = env
        .service
        .wait_for_terminal(manifest.batch_id, WAIT_POLL, WAIT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(status.total, 20);
    assert_eq!(status.succeeded, 20);
    assert_eq!(status.dead_lettered, 0);
    assert_eq!(status.failed_in_retry, 0);
    assert!(status.terminal);

    assert_eq!(handler.records_applied(), 10_000);
    assert_eq!(handler.distinct_jobs(), 20);

    worker.shutdown(Duration::from_secs(2)).await.unwrap();
    assert!(env.backends.raw_queue.is_empty());
}

#[tokio::test]
async fn test_permanent_failure_exhausts_attempts_then_dead_letters() {
    init_test_logging();
    let env = TestEnvironment::fast();
    let handler = Arc::new(FailingHandler::always(
        vec![0],
        ProcessingError::permanent("malformed record"),
    ));
    let worker = env.start_worker("lifecycle-2", handler.clone(), Arc::new(RetryAllClassifier));

    let manifest = env
        .service
        .create_batch(BatchSource::count(10), Some(10), Some(3))
        .await
        .unwrap();

    let status = env
        .service
        .wait_for_terminal(manifest.batch_id, WAIT_POLL, WAIT_TIMEOUT)
        .await
        .unwrap();
    worker.shutdown(Duration::from_secs(2)).await.unwrap();

    assert!(status.terminal);
    assert_eq!(status.total, 1);
    assert_eq!(status.succeeded, 0);
    assert_eq!(status.dead_lettered, 1);
    assert_eq!(status.failed_in_retry, 0);
    assert_eq!(handler.total_attempts(), 3);

    let entries = env.service.list_dead_letters(manifest.batch_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attempts_made, 3);
    assert!(entries[0].last_error.contains("malformed record"));
}

#[tokio::test]
async fn test_poison_failure_is_dead_lettered_without_retry() {
    init_test_logging();
    let env = TestEnvironment::fast();
    let handler = Arc::new(FailingHandler::always(
        vec![1, 3],
        ProcessingError::permanent("schema violation"),
    ));
    let worker = env.start_worker("lifecycle-3", handler.clone(), Arc::new(ErrorKindClassifier));

    let manifest = env
        .service
        .create_batch(BatchSource::count(50), Some(10), Some(5))
        .await
        .unwrap();
    let status = env
        .service
        .wait_for_terminal(manifest.batch_id, WAIT_POLL, WAIT_TIMEOUT)
        .await
        .unwrap();
    worker.shutdown(Duration::from_secs(2)).await.unwrap();

    assert_eq!(status.succeeded, 3);
    assert_eq!(status.dead_lettered, 2);
    assert_eq!(handler.total_attempts(), 5);

    let progress = env.service.get_progress(manifest.batch_id).await.unwrap();
    assert_eq!(progress.error_samples.len(), 2);
    assert!(progress.error_samples.iter().all(|sample| sample.permanent));
}

#[tokio::test]
async fn test_transient_failures_recover_and_release_retry_count() {
    init_test_logging();
    let env = TestEnvironment::fast();
    let handler = Arc::new(FailingHandler::recovering(vec![0, 2, 4], 2));
    let worker = env.start_worker("lifecycle-4", handler.clone(), Arc::new(ErrorKindClassifier));

    let manifest = env
        .service
        .create_batch(BatchSource::count(100), Some(20), Some(3))
        .await
        .unwrap();
    let status = env
        .service
        .wait_for_terminal(manifest.batch_id, WAIT_POLL, WAIT_TIMEOUT)
        .await
        .unwrap();
    let stats = worker.stats();
    worker.shutdown(Duration::from_secs(2)).await.unwrap();

    assert_eq!(status.succeeded, 5);
    assert_eq!(status.dead_lettered, 0);
    assert_eq!(status.failed_in_retry, 0);
    assert_eq!(handler.total_attempts(), 5 + 3 * 2);
    assert_eq!(stats.retried, 6);

    // transient failures still leave samples behind
    let progress = env.service.get_progress(manifest.batch_id).await.unwrap();
    assert_eq!(progress.error_samples.len(), 6);
    assert!(progress.error_samples.iter().all(|sample| !sample.permanent));
}

#[tokio::test]
async fn test_counters_never_exceed_job_count_while_running() {
    init_test_logging();
    let env = TestEnvironment::fast();
    let handler = Arc::new(FailingHandler::recovering((0..40).step_by(3).collect(), 1));
    let worker = env.start_worker("lifecycle-5", handler, Arc::new(ErrorKindClassifier));

    let manifest = env
        .service
        .create_batch(BatchSource::count(400), Some(10), None)
        .await
        .unwrap();

    let mut terminal = false;
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !terminal && tokio::time::Instant::now() < deadline {
        let progress = env.backends.progress.snapshot(manifest.batch_id).await.unwrap();
        assert!(progress.observed_count() <= progress.job_count);
        terminal = progress.is_terminal();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(terminal);
    worker.shutdown(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn test_several_workers_share_one_batch() {
    init_test_logging();
    let env = TestEnvironment::fast();
    let handler = Arc::new(RecordingHandler::with_delay(Duration::from_millis(2)));
    let workers: Vec<_> = (0..3)
        .map(|index| {
            env.start_worker(
                &format!("shared-{index}"),
                handler.clone(),
                Arc::new(ErrorKindClassifier),
            )
        })
        .collect();

    let manifest = env
        .service
        .create_batch(BatchSource::count(10_000), Some(100), None)
        .await
        .unwrap();
    let status = env
        .service
        .wait_for_terminal(manifest.batch_id, WAIT_POLL, WAIT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(status.succeeded, 100);

    let mut total_succeeded = 0;
    for worker in workers {
        total_succeeded += worker.stats().succeeded;
        worker.shutdown(Duration::from_secs(2)).await.unwrap();
    }
    assert_eq!(total_succeeded, 100);
    assert_eq!(handler.records_applied(), 10_000);
}

#[tokio::test]
async fn test_record_id_batch_and_terminal_archive() {
    init_test_logging();
    let env = TestEnvironment::fast();
    let handler = Arc::new(RecordingHandler::new());
    let worker = env.start_worker("lifecycle-7", handler.clone(), Arc::new(ErrorKindClassifier));

    let ids: Vec<String> = (0..25).map(|n| format!("customer-{n}")).collect();
    let manifest = env
        .service
        .create_batch(BatchSource::records(ids), Some(10), None)
        .await
        .unwrap();
    assert_eq!(manifest.job_count, 3);

    env.service
        .wait_for_terminal(manifest.batch_id, WAIT_POLL, WAIT_TIMEOUT)
        .await
        .unwrap();
    worker.shutdown(Duration::from_secs(2)).await.unwrap();

    // status reads archive a terminal batch exactly once
    let first = env.service.get_progress(manifest.batch_id).await.unwrap();
    env.service.get_batch_status(manifest.batch_id).await.unwrap();
    let second = env.service.get_progress(manifest.batch_id).await.unwrap();
    assert!(first.archived_at.is_some());
    assert_eq!(first.archived_at, second.archived_at);
    assert_eq!(handler.records_applied(), 25);
}

#[tokio::test]
async fn test_unknown_batch_status_is_not_found() {
    let env = TestEnvironment::fast();
    let err = env
        .service
        .get_batch_status(tasker_batch::BatchId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, tasker_batch::BatchError::BatchNotFound { .. }));
}

#[tokio::test]
async fn test_progress_counts_match_kinds() {
    let env = TestEnvironment::fast();
    let manifest = env
        .service
        .create_batch(BatchSource::count(30), Some(10), None)
        .await
        .unwrap();
    let progress = env.backends.progress.clone();
    progress.increment(manifest.batch_id, ProgressKind::Succeeded).await.unwrap();
    progress.increment(manifest.batch_id, ProgressKind::DeadLettered).await.unwrap();

    let status = env.service.get_batch_status(manifest.batch_id).await.unwrap();
    assert_eq!((status.succeeded, status.dead_lettered, status.terminal), (1, 1, false));
}
