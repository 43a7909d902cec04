use std::sync::Arc;
use std::time::Duration;
use tasker_batch::config::BatchConfig;
use tasker_batch::retry::FailureClassifier;
use tasker_batch::service::{BatchService, InMemoryBackends};
use tasker_batch::worker::{ChunkHandler, WorkerHandle};

/// Configuration with short polls, leases and backoffs for fast tests
pub fn fast_config() -> BatchConfig {
    let mut config = BatchConfig::default();
    config.queue.poll_timeout_ms = 20;
    config.queue.poll_interval_ms = 5;
    config.queue.lease_duration_ms = 2_000;
    config.retry.backoff_base_ms = 5;
    config.retry.backoff_cap_ms = 40;
    config.worker.concurrency = 2;
    config.worker.unavailable_backoff_base_ms = 5;
    config.worker.unavailable_backoff_cap_ms = 20;
    config
}

pub struct TestEnvironment {
    pub config: BatchConfig,
    pub backends: InMemoryBackends,
    pub service: BatchService,
}

impl TestEnvironment {
    pub fn new(config: BatchConfig) -> Self {
        let backends = InMemoryBackends::new(&config);
        let service = backends
            .service(config.clone())
            .expect("test configuration should be valid");
        Self {
            config,
            backends,
            service,
        }
    }

    pub fn fast() -> Self {
        Self::new(fast_config())
    }

    pub fn start_worker(
        &self,
        worker_id: &str,
        handler: Arc<dyn ChunkHandler>,
        classifier: Arc<dyn FailureClassifier>,
    ) -> WorkerHandle {
        self.service
            .worker_builder()
            .worker_id(worker_id)
            .handler(handler)
            .classifier(classifier)
            .build()
            .expect("worker should build")
            .start()
    }
}

pub const WAIT_POLL: Duration = Duration::from_millis(10);
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(WAIT_POLL).await;
    }
    condition()
}
