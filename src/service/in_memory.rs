use super::BatchService;
use crate::config::BatchConfig;
use crate::dead_letter::InMemoryDeadLetterStore;
use crate::error::Result;
use crate::messaging::{InMemoryJobQueue, JobQueue, ProtectedJobQueue};
use crate::pressure::PressureMonitor;
use crate::progress::InMemoryProgressTracker;
use crate::registry::InMemoryBatchRegistry;
use std::sync::Arc;

/// Process-local backends sharing one queue, tracker, dead-letter store and
/// registry. Services and workers built from the same instance see the same
/// state.
#[derive(Clone)]
pub struct InMemoryBackends {
    /// Unwrapped queue, for fault injection
    pub raw_queue: Arc<InMemoryJobQueue>,
    /// Queue handed to services and workers; circuit-breaker protected when
    /// enabled in configuration
    pub queue: Arc<dyn JobQueue>,
    pub progress: Arc<InMemoryProgressTracker>,
    pub dead_letters: Arc<InMemoryDeadLetterStore>,
    pub registry: Arc<InMemoryBatchRegistry>,
    pub pressure: Arc<PressureMonitor>,
}

impl std::fmt::Debug for InMemoryBackends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackends")
            .field("queue", &self.queue.provider_name())
            .field("queued_jobs", &self.raw_queue.len())
            .finish()
    }
}

impl InMemoryBackends {
    pub fn new(config: &BatchConfig) -> Self {
        let raw_queue = Arc::new(InMemoryJobQueue::from_config(&config.queue));
        let queue: Arc<dyn JobQueue> = if config.circuit_breaker.enabled {
            Arc::new(ProtectedJobQueue::new(
                Arc::clone(&raw_queue),
                config.circuit_breaker.clone(),
            ))
        } else {
            Arc::clone(&raw_queue) as Arc<dyn JobQueue>
        };

        Self {
            raw_queue,
            queue,
            progress: Arc::new(InMemoryProgressTracker::new(
                config.progress.error_sample_capacity,
            )),
            dead_letters: Arc::new(InMemoryDeadLetterStore::new()),
            registry: Arc::new(InMemoryBatchRegistry::new()),
            pressure: Arc::new(PressureMonitor::new(config.pressure.clone())),
        }
    }

    pub fn service(&self, config: BatchConfig) -> Result<BatchService> {
        BatchService::new(
            config,
            Arc::clone(&self.queue),
            self.progress.clone(),
            self.dead_letters.clone(),
            self.registry.clone(),
            Arc::clone(&self.pressure),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BatchError;
    use crate::dead_letter::DeadLetterStore;
    use crate::messaging::JobQueue;
    use crate::models::{BatchId, BatchSource, ProgressKind};
    use crate::progress::ProgressTracker;
    use std::time::Duration;

    fn fast_config() -> BatchConfig {
        let mut config = BatchConfig::default();
        config.queue.poll_timeout_ms = 20;
        config.queue.poll_interval_ms = 5;
        config
    }

    #[tokio::test]
    async fn test_create_batch_registers_and_enqueues() {
        let config = fast_config();
        let backends = InMemoryBackends::new(&config);
        let service = backends.service(config).unwrap();

        let manifest = service
            .create_batch(BatchSource::count(10_000), Some(500), None)
            .await
            .unwrap();
        assert_eq!(manifest.job_count, 20);
        assert_eq!(backends.raw_queue.len(), 20);

        let status = service.get_batch_status(manifest.batch_id).await.unwrap();
        assert_eq!(status.total, 20);
        assert_eq!(status.succeeded, 0);
        assert!(!status.terminal);
        assert!(!status.cancelled);
    }

    #[tokio::test]
    async fn test_invalid_chunk_size_enqueues_nothing() {
        let config = fast_config();
        let backends = InMemoryBackends::new(&config);
        let service = backends.service(config).unwrap();

        let err = service
            .create_batch(BatchSource::count(100), Some(0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig { .. }));
        assert!(backends.raw_queue.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_size_above_configured_cap_is_rejected() {
        let mut config = fast_config();
        config.partition.max_chunk_size = 500;
        let backends = InMemoryBackends::new(&config);
        let service = backends.service(config).unwrap();

        let err = service
            .create_batch(BatchSource::count(1_000), Some(501), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig { .. }));
        assert!(backends.raw_queue.is_empty());

        service
            .create_batch(BatchSource::count(1_000), Some(500), None)
            .await
            .unwrap();
        assert_eq!(backends.raw_queue.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_immediately_terminal() {
        let config = fast_config();
        let backends = InMemoryBackends::new(&config);
        let service = backends.service(config).unwrap();

        let manifest = service
            .create_batch(BatchSource::count(0), Some(10), None)
            .await
            .unwrap();
        let status = service.get_batch_status(manifest.batch_id).await.unwrap();
        assert_eq!(status.total, 0);
        assert!(status.terminal);
        assert!(service
            .get_progress(manifest.batch_id)
            .await
            .unwrap()
            .archived_at
            .is_some());
    }

    #[tokio::test]
    async fn test_default_chunk_size_follows_pressure_advice() {
        let mut config = fast_config();
        config.partition.default_chunk_size = 400;
        config.pressure.window_size = 2;
        config.pressure.sustained_windows = 1;
        config.pressure.latency_threshold_ms = 5;
        let backends = InMemoryBackends::new(&config);
        let service = backends.service(config).unwrap();

        assert_eq!(service.resolve_chunk_size(None), 400);
        backends.pressure.record_latency("ack", Duration::from_millis(50));
        backends.pressure.record_latency("ack", Duration::from_millis(50));
        assert_eq!(service.resolve_chunk_size(None), 200);
        // explicit sizes are never overridden
        assert_eq!(service.resolve_chunk_size(Some(400)), 400);

        let manifest = service
            .create_batch(BatchSource::count(1_000), None, None)
            .await
            .unwrap();
        assert_eq!(manifest.chunk_size, 200);
        assert_eq!(manifest.job_count, 5);
    }

    #[tokio::test]
    async fn test_plan_batch_is_side_effect_free() {
        let config = fast_config();
        let backends = InMemoryBackends::new(&config);
        let service = backends.service(config).unwrap();

        let plan = service
            .plan_batch(&BatchSource::records(["a", "b", "c"]), Some(2), Some(5))
            .unwrap();
        assert_eq!(plan.chunk_sizes(), vec![2, 1]);
        assert_eq!(plan.manifest.max_attempts, 5);
        assert!(backends.raw_queue.is_empty());
        assert!(service.get_manifest(plan.manifest.batch_id).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_is_reported_once() {
        let config = fast_config();
        let backends = InMemoryBackends::new(&config);
        let service = backends.service(config).unwrap();

        let manifest = service
            .create_batch(BatchSource::count(10), Some(5), None)
            .await
            .unwrap();
        assert!(service.cancel_batch(manifest.batch_id).await.unwrap());
        assert!(!service.cancel_batch(manifest.batch_id).await.unwrap());
        assert!(service.get_batch_status(manifest.batch_id).await.unwrap().cancelled);
    }

    #[tokio::test]
    async fn test_requeue_failure_restores_dead_letter() {
        let config = fast_config();
        let backends = InMemoryBackends::new(&config);
        let service = backends.service(config).unwrap();

        let manifest = service
            .create_batch(BatchSource::count(5), Some(5), Some(1))
            .await
            .unwrap();
        let leased = backends
            .raw_queue
            .dequeue(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        backends.raw_queue.ack(leased.job_id(), leased.token()).await.unwrap();
        backends
            .dead_letters
            .append(crate::models::DeadLetterEntry::new(&leased.job, "bad", true))
            .await
            .unwrap();
        backends
            .progress
            .increment(manifest.batch_id, ProgressKind::DeadLettered)
            .await
            .unwrap();

        backends.raw_queue.set_available(false);
        let err = service.requeue_dead_letter(leased.job_id()).await.unwrap_err();
        assert!(err.is_unavailable());

        let status = service.get_batch_status(manifest.batch_id).await.unwrap();
        assert_eq!(status.dead_lettered, 1);
        assert_eq!(service.list_dead_letters(manifest.batch_id).await.unwrap().len(), 1);

        backends.raw_queue.set_available(true);
        let replayed = service.requeue_dead_letter(leased.job_id()).await.unwrap();
        assert_eq!(replayed.replay_generation, 1);
        assert_eq!(replayed.attempt, 0);
        assert_eq!(backends.raw_queue.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_batch_status() {
        let config = fast_config();
        let backends = InMemoryBackends::new(&config);
        let service = backends.service(config).unwrap();
        let err = service.get_batch_status(BatchId::new()).await.unwrap_err();
        assert!(matches!(err, BatchError::BatchNotFound { .. }));
    }
}
