use super::handler::ChunkHandler;
use super::stats::WorkerStats;
use super::worker::Worker;
use crate::config::BatchConfig;
use crate::dead_letter::DeadLetterStore;
use crate::error::{BatchError, Result};
use crate::messaging::JobQueue;
use crate::pressure::PressureMonitor;
use crate::progress::ProgressTracker;
use crate::registry::BatchRegistry;
use crate::retry::{BackoffPolicy, FailureClassifier, RetryController};
use std::sync::Arc;
use uuid::Uuid;

/// Assembles a [`Worker`] from its collaborators.
///
/// Every collaborator is required, including the failure classifier: there is
/// no implicit default for deciding what counts as a poison job.
#[derive(Default)]
pub struct WorkerBuilder {
    worker_id: Option<String>,
    config: BatchConfig,
    queue: Option<Arc<dyn JobQueue>>,
    progress: Option<Arc<dyn ProgressTracker>>,
    dead_letters: Option<Arc<dyn DeadLetterStore>>,
    registry: Option<Arc<dyn BatchRegistry>>,
    handler: Option<Arc<dyn ChunkHandler>>,
    classifier: Option<Arc<dyn FailureClassifier>>,
    pressure: Option<Arc<PressureMonitor>>,
}

impl WorkerBuilder {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn dead_letters(mut self, dead_letters: Arc<dyn DeadLetterStore>) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn BatchRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn handler(mut self, handler: Arc<dyn ChunkHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Optional; when set, settle round-trip latencies feed the chunk-size advisor
    pub fn pressure(mut self, pressure: Arc<PressureMonitor>) -> Self {
        self.pressure = Some(pressure);
        self
    }

    pub fn build(self) -> Result<Worker> {
        self.config.validate()?;

        let queue = self.queue.ok_or_else(|| missing("queue"))?;
        let progress = self.progress.ok_or_else(|| missing("progress"))?;
        let dead_letters = self.dead_letters.ok_or_else(|| missing("dead_letters"))?;
        let registry = self.registry.ok_or_else(|| missing("registry"))?;
        let handler = self.handler.ok_or_else(|| missing("handler"))?;
        let classifier = self.classifier.ok_or_else(|| missing("classifier"))?;

        let worker_id = self
            .worker_id
            .unwrap_or_else(|| format!("worker-{}", &Uuid::new_v4().simple().to_string()[..8]));
        let retry = RetryController::new(BackoffPolicy::from_retry_config(&self.config.retry), classifier);

        Ok(Worker {
            worker_id,
            queue,
            progress,
            dead_letters,
            registry,
            handler,
            retry,
            pressure: self.pressure,
            queue_config: self.config.queue,
            worker_config: self.config.worker,
            stats: Arc::new(WorkerStats::default()),
        })
    }
}

fn missing(component: &str) -> BatchError {
    BatchError::invalid_config(component, "required worker component was not provided")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dead_letter::InMemoryDeadLetterStore;
    use crate::error::ProcessingError;
    use crate::messaging::InMemoryJobQueue;
    use crate::models::Job;
    use crate::progress::InMemoryProgressTracker;
    use crate::registry::InMemoryBatchRegistry;
    use crate::retry::ErrorKindClassifier;
    use crate::worker::handler_fn;

    fn complete_builder() -> WorkerBuilder {
        WorkerBuilder::new(BatchConfig::default())
            .queue(Arc::new(InMemoryJobQueue::new()))
            .progress(Arc::new(InMemoryProgressTracker::default()))
            .dead_letters(Arc::new(InMemoryDeadLetterStore::new()))
            .registry(Arc::new(InMemoryBatchRegistry::new()))
            .handler(Arc::new(handler_fn("noop", |_job: Job| async {
                Ok::<(), ProcessingError>(())
            })))
    }

    #[test]
    fn test_classifier_is_required() {
        let err = complete_builder().build().unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig { ref field, .. } if field == "classifier"));
    }

    #[test]
    fn test_build_with_all_components() {
        let worker = complete_builder()
            .classifier(Arc::new(ErrorKindClassifier))
            .worker_id("worker-a")
            .build()
            .unwrap();
        assert_eq!(worker.worker_id(), "worker-a");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = BatchConfig::default();
        config.worker.concurrency = 0;
        let err = WorkerBuilder::new(config).build().unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig { .. }));
    }
}
