//! # Configuration
//!
//! Runtime knobs for partitioning, leasing, retry, worker concurrency, progress
//! sampling, pressure advice, circuit breaking and the database backend.
//!
//! Every section carries serde defaults, so a configuration file only needs the
//! values it overrides. Load with [`ConfigLoader`]:
//!
//! ```rust,no_run
//! use tasker_batch::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load()?;
//! println!("lease duration: {:?}", config.queue.lease_duration());
//! # Ok(())
//! # }
//! ```

pub mod loader;

pub use loader::ConfigLoader;

use crate::constants::{defaults, limits, DEFAULT_QUEUE_NAME};
use crate::error::{BatchError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub partition: PartitionConfig,
    pub queue: QueueConfig,
    pub retry: RetryConfig,
    pub worker: WorkerConfig,
    pub progress: ProgressConfig,
    pub pressure: PressureConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Used when a batch is submitted without an explicit chunk size
    pub default_chunk_size: u64,
    pub max_chunk_size: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            default_chunk_size: defaults::CHUNK_SIZE,
            max_chunk_size: defaults::MAX_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub queue_name: String,
    pub lease_duration_ms: u64,
    /// How long a dequeue blocks on an empty queue
    pub poll_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub lease_extension_enabled: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            lease_duration_ms: defaults::LEASE_DURATION_MS,
            poll_timeout_ms: defaults::POLL_TIMEOUT_MS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            lease_extension_enabled: true,
        }
    }
}

impl QueueConfig {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Heartbeat period for lease extension
    pub fn heartbeat_interval(&self) -> Duration {
        self.lease_duration() / 2
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            backoff_base_ms: defaults::BACKOFF_BASE_MS,
            backoff_cap_ms: defaults::BACKOFF_CAP_MS,
            backoff_multiplier: defaults::BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent leases held by one worker process
    pub concurrency: usize,
    pub max_job_duration_ms: u64,
    pub unavailable_backoff_base_ms: u64,
    pub unavailable_backoff_cap_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::WORKER_CONCURRENCY,
            max_job_duration_ms: defaults::MAX_JOB_DURATION_MS,
            unavailable_backoff_base_ms: defaults::UNAVAILABLE_BACKOFF_BASE_MS,
            unavailable_backoff_cap_ms: defaults::UNAVAILABLE_BACKOFF_CAP_MS,
            shutdown_timeout_ms: defaults::SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl WorkerConfig {
    pub fn max_job_duration(&self) -> Duration {
        Duration::from_millis(self.max_job_duration_ms)
    }

    pub fn unavailable_backoff_base(&self) -> Duration {
        Duration::from_millis(self.unavailable_backoff_base_ms)
    }

    pub fn unavailable_backoff_cap(&self) -> Duration {
        Duration::from_millis(self.unavailable_backoff_cap_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub error_sample_capacity: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            error_sample_capacity: defaults::ERROR_SAMPLE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PressureConfig {
    pub enabled: bool,
    pub latency_threshold_ms: u64,
    /// Samples per evaluation window
    pub window_size: usize,
    /// Consecutive hot windows before advising a reduction
    pub sustained_windows: u32,
    pub reduction_factor: f64,
    pub min_chunk_size: u64,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            latency_threshold_ms: defaults::PRESSURE_LATENCY_THRESHOLD_MS,
            window_size: defaults::PRESSURE_WINDOW_SIZE,
            sustained_windows: defaults::PRESSURE_SUSTAINED_WINDOWS,
            reduction_factor: defaults::PRESSURE_REDUCTION_FACTOR,
            min_chunk_size: defaults::MIN_CHUNK_SIZE,
        }
    }
}

impl PressureConfig {
    pub fn latency_threshold(&self) -> Duration {
        Duration::from_millis(self.latency_threshold_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Consecutive backend failures that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before probing
    pub timeout_ms: u64,
    /// Successful half-open calls required to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: defaults::CIRCUIT_FAILURE_THRESHOLD,
            timeout_ms: defaults::CIRCUIT_TIMEOUT_MS,
            success_threshold: defaults::CIRCUIT_SUCCESS_THRESHOLD,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: defaults::DATABASE_MAX_CONNECTIONS,
        }
    }
}

impl BatchConfig {
    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.partition.default_chunk_size == 0 {
            return Err(BatchError::invalid_config(
                "partition.default_chunk_size",
                "must be greater than 0",
            ));
        }

        if self.partition.default_chunk_size > self.partition.max_chunk_size {
            return Err(BatchError::invalid_config(
                "partition.default_chunk_size",
                format!(
                    "{} exceeds partition.max_chunk_size {}",
                    self.partition.default_chunk_size, self.partition.max_chunk_size
                ),
            ));
        }

        if self.queue.lease_duration_ms == 0 {
            return Err(BatchError::invalid_config(
                "queue.lease_duration_ms",
                "must be greater than 0",
            ));
        }

        if self.queue.lease_duration_ms <= self.queue.poll_interval_ms {
            return Err(BatchError::invalid_config(
                "queue.lease_duration_ms",
                "must be longer than queue.poll_interval_ms",
            ));
        }

        if self.retry.max_attempts == 0 || self.retry.max_attempts > limits::MAX_ATTEMPTS_LIMIT {
            return Err(BatchError::invalid_config(
                "retry.max_attempts",
                format!("must be between 1 and {}", limits::MAX_ATTEMPTS_LIMIT),
            ));
        }

        if self.retry.backoff_base_ms > self.retry.backoff_cap_ms {
            return Err(BatchError::invalid_config(
                "retry.backoff_base_ms",
                "must not exceed retry.backoff_cap_ms",
            ));
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(BatchError::invalid_config(
                "retry.backoff_multiplier",
                "must be at least 1.0",
            ));
        }

        if self.worker.concurrency == 0 || self.worker.concurrency > limits::MAX_WORKER_CONCURRENCY
        {
            return Err(BatchError::invalid_config(
                "worker.concurrency",
                format!("must be between 1 and {}", limits::MAX_WORKER_CONCURRENCY),
            ));
        }

        if self.worker.concurrency > limits::RECOMMENDED_WORKER_CONCURRENCY {
            warn!(
                concurrency = self.worker.concurrency,
                recommended_max = limits::RECOMMENDED_WORKER_CONCURRENCY,
                "⚠️ Worker concurrency above recommended range; scale with more workers instead"
            );
        }

        if self.pressure.reduction_factor <= 0.0 || self.pressure.reduction_factor >= 1.0 {
            return Err(BatchError::invalid_config(
                "pressure.reduction_factor",
                "must be between 0.0 and 1.0 exclusive",
            ));
        }

        if self.pressure.window_size == 0 {
            return Err(BatchError::invalid_config(
                "pressure.window_size",
                "must be greater than 0",
            ));
        }

        if self.pressure.min_chunk_size == 0 {
            return Err(BatchError::invalid_config(
                "pressure.min_chunk_size",
                "must be greater than 0",
            ));
        }

        if self.circuit_breaker.enabled
            && (self.circuit_breaker.failure_threshold == 0
                || self.circuit_breaker.success_threshold == 0)
        {
            return Err(BatchError::invalid_config(
                "circuit_breaker",
                "thresholds must be greater than 0",
            ));
        }

        Ok(())
    }

    /// JSON view with credentials masked
    pub fn sanitized_for_logging(&self) -> serde_json::Value {
        let mut value = serde_json::json!(self);
        if let Some(url) = self.database.url.as_deref() {
            value["database"]["url"] = serde_json::Value::String(mask_database_url(url));
        }
        value
    }
}

/// Replace the password component of a connection URL
fn mask_database_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return "[MASKED]".to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
