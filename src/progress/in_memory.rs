//! In-process progress tracker backed by `DashMap`, one lock per batch.

use super::ProgressTracker;
use crate::constants::defaults;
use crate::error::{BatchError, Result};
use crate::models::{
    BatchId, BatchManifest, ErrorSample, ErrorSampleBuffer, ProgressKind, ProgressRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
struct BatchCounters {
    succeeded: u64,
    failed: u64,
    dead_lettered: u64,
    samples: ErrorSampleBuffer,
    updated_at: DateTime<Utc>,
    archived_at: Option<DateTime<Utc>>,
}

impl BatchCounters {
    fn slot(&mut self, kind: ProgressKind) -> &mut u64 {
        match kind {
            ProgressKind::Succeeded => &mut self.succeeded,
            ProgressKind::Failed => &mut self.failed,
            ProgressKind::DeadLettered => &mut self.dead_lettered,
        }
    }

    fn observed(&self) -> u64 {
        self.succeeded + self.failed + self.dead_lettered
    }

    fn touch(&mut self, job_count: u64) {
        self.updated_at = Utc::now();
        if self.succeeded + self.dead_lettered != job_count {
            self.archived_at = None;
        }
    }
}

#[derive(Debug)]
struct BatchProgress {
    job_count: u64,
    created_at: DateTime<Utc>,
    counters: Mutex<BatchCounters>,
}

#[derive(Debug)]
pub struct InMemoryProgressTracker {
    batches: DashMap<BatchId, Arc<BatchProgress>>,
    sample_capacity: usize,
}

impl Default for InMemoryProgressTracker {
    fn default() -> Self {
        Self::new(defaults::ERROR_SAMPLE_CAPACITY)
    }
}

impl InMemoryProgressTracker {
    pub fn new(sample_capacity: usize) -> Self {
        Self {
            batches: DashMap::new(),
            sample_capacity,
        }
    }

    fn batch(&self, batch_id: BatchId) -> Result<Arc<BatchProgress>> {
        self.batches
            .get(&batch_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(BatchError::BatchNotFound { batch_id })
    }
}

#[async_trait]
impl ProgressTracker for InMemoryProgressTracker {
    async fn create(&self, manifest: &BatchManifest) -> Result<()> {
        let now = Utc::now();
        self.batches.entry(manifest.batch_id).or_insert_with(|| {
            Arc::new(BatchProgress {
                job_count: manifest.job_count,
                created_at: now,
                counters: Mutex::new(BatchCounters {
                    succeeded: 0,
                    failed: 0,
                    dead_lettered: 0,
                    samples: ErrorSampleBuffer::new(self.sample_capacity),
                    updated_at: now,
                    archived_at: None,
                }),
            })
        });
        debug!(batch_id = %manifest.batch_id, job_count = manifest.job_count, "📊 Progress record created");
        Ok(())
    }

    async fn increment(&self, batch_id: BatchId, kind: ProgressKind) -> Result<u64> {
        let batch = self.batch(batch_id)?;
        let mut counters = batch.counters.lock();
        if counters.observed() >= batch.job_count {
            return Err(BatchError::state_transition(format!(
                "increment of {kind} would exceed job count {} for batch {batch_id}",
                batch.job_count
            )));
        }
        let slot = counters.slot(kind);
        *slot += 1;
        let value = *slot;
        counters.touch(batch.job_count);
        Ok(value)
    }

    async fn transfer(
        &self,
        batch_id: BatchId,
        from: ProgressKind,
        to: ProgressKind,
    ) -> Result<()> {
        let batch = self.batch(batch_id)?;
        let mut counters = batch.counters.lock();
        let source = counters.slot(from);
        if *source == 0 {
            return Err(BatchError::state_transition(format!(
                "cannot move {from} to {to} for batch {batch_id}: {from} is zero"
            )));
        }
        *source -= 1;
        *counters.slot(to) += 1;
        counters.touch(batch.job_count);
        Ok(())
    }

    async fn decrement(&self, batch_id: BatchId, kind: ProgressKind) -> Result<u64> {
        let batch = self.batch(batch_id)?;
        let mut counters = batch.counters.lock();
        let slot = counters.slot(kind);
        if *slot == 0 {
            return Err(BatchError::state_transition(format!(
                "cannot decrement {kind} for batch {batch_id}: already zero"
            )));
        }
        *slot -= 1;
        let value = *slot;
        counters.touch(batch.job_count);
        Ok(value)
    }

    async fn record_error(&self, batch_id: BatchId, sample: ErrorSample) -> Result<()> {
        let batch = self.batch(batch_id)?;
        batch.counters.lock().samples.push(sample);
        Ok(())
    }

    async fn snapshot(&self, batch_id: BatchId) -> Result<ProgressRecord> {
        let batch = self.batch(batch_id)?;
        let counters = batch.counters.lock();
        Ok(ProgressRecord {
            batch_id,
            job_count: batch.job_count,
            succeeded_count: counters.succeeded,
            failed_count: counters.failed,
            dead_lettered_count: counters.dead_lettered,
            error_samples: counters.samples.to_vec(),
            created_at: batch.created_at,
            updated_at: counters.updated_at,
            archived_at: counters.archived_at,
        })
    }

    async fn archive(&self, batch_id: BatchId) -> Result<()> {
        let batch = self.batch(batch_id)?;
        let mut counters = batch.counters.lock();
        if counters.succeeded + counters.dead_lettered != batch.job_count {
            return Err(BatchError::state_transition(format!(
                "batch {batch_id} is not terminal"
            )));
        }
        if counters.archived_at.is_none() {
            counters.archived_at = Some(Utc::now());
            info!(batch_id = %batch_id, "🗄️ Progress record archived");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobId;
    use crate::partitioner::partition;

    async fn tracker_with_batch(jobs: u64) -> (InMemoryProgressTracker, BatchId) {
        let tracker = InMemoryProgressTracker::new(3);
        let (manifest, _) = partition(jobs * 10, 10).unwrap();
        tracker.create(&manifest).await.unwrap();
        (tracker, manifest.batch_id)
    }

    #[tokio::test]
    async fn test_increment_and_snapshot() {
        let (tracker, batch_id) = tracker_with_batch(3).await;
        assert_eq!(tracker.increment(batch_id, ProgressKind::Succeeded).await.unwrap(), 1);
        assert_eq!(tracker.increment(batch_id, ProgressKind::DeadLettered).await.unwrap(), 1);

        let snapshot = tracker.snapshot(batch_id).await.unwrap();
        assert_eq!(snapshot.succeeded_count, 1);
        assert_eq!(snapshot.dead_lettered_count, 1);
        assert!(!tracker.is_terminal(batch_id).await.unwrap());

        tracker.increment(batch_id, ProgressKind::Succeeded).await.unwrap();
        assert!(tracker.is_terminal(batch_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_beyond_job_count_is_rejected() {
        let (tracker, batch_id) = tracker_with_batch(1).await;
        tracker.increment(batch_id, ProgressKind::Succeeded).await.unwrap();
        assert!(tracker.increment(batch_id, ProgressKind::Succeeded).await.is_err());
    }

    #[tokio::test]
    async fn test_transfer_keeps_observed_count() {
        let (tracker, batch_id) = tracker_with_batch(2).await;
        tracker.increment(batch_id, ProgressKind::Failed).await.unwrap();
        tracker
            .transfer(batch_id, ProgressKind::Failed, ProgressKind::Succeeded)
            .await
            .unwrap();

        let snapshot = tracker.snapshot(batch_id).await.unwrap();
        assert_eq!(snapshot.failed_count, 0);
        assert_eq!(snapshot.succeeded_count, 1);
        assert!(tracker
            .transfer(batch_id, ProgressKind::Failed, ProgressKind::Succeeded)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let (tracker, batch_id) = tracker_with_batch(200).await;
        let tracker = Arc::new(tracker);

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move {
                    tracker.increment(batch_id, ProgressKind::Succeeded).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = tracker.snapshot(batch_id).await.unwrap();
        assert_eq!(snapshot.succeeded_count, 200);
        assert!(snapshot.is_terminal());
    }

    #[tokio::test]
    async fn test_error_samples_are_bounded() {
        let (tracker, batch_id) = tracker_with_batch(1).await;
        for attempt in 0..5 {
            tracker
                .record_error(batch_id, ErrorSample::new(JobId::new(), attempt, "boom", false))
                .await
                .unwrap();
        }
        let snapshot = tracker.snapshot(batch_id).await.unwrap();
        assert_eq!(snapshot.error_samples.len(), 3);
        assert_eq!(snapshot.error_samples[0].attempt, 2);
    }

    #[tokio::test]
    async fn test_archive_and_reopen_on_decrement() {
        let (tracker, batch_id) = tracker_with_batch(1).await;
        assert!(tracker.archive(batch_id).await.is_err());

        tracker.increment(batch_id, ProgressKind::DeadLettered).await.unwrap();
        tracker.archive(batch_id).await.unwrap();
        assert!(tracker.snapshot(batch_id).await.unwrap().archived_at.is_some());

        tracker.decrement(batch_id, ProgressKind::DeadLettered).await.unwrap();
        let snapshot = tracker.snapshot(batch_id).await.unwrap();
        assert!(snapshot.archived_at.is_none());
        assert!(!snapshot.is_terminal());
    }

    #[tokio::test]
    async fn test_decrement_of_zero_counter_is_rejected() {
        let (tracker, batch_id) = tracker_with_batch(2).await;
        let err = tracker
            .decrement(batch_id, ProgressKind::DeadLettered)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::StateTransition { .. }));
        assert_eq!(tracker.snapshot(batch_id).await.unwrap().dead_lettered_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_batch() {
        let tracker = InMemoryProgressTracker::default();
        let err = tracker.snapshot(BatchId::new()).await.unwrap_err();
        assert!(matches!(err, BatchError::BatchNotFound { .. }));
    }
}
