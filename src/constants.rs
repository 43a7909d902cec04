//! # System Constants
//!
//! Defaults and fixed names that define the operational boundaries of the
//! batch engine. Runtime values come from [`crate::config::BatchConfig`];
//! these are the fallbacks.

/// Default knobs for the config surface
pub mod defaults {
    pub const CHUNK_SIZE: u64 = 500;
    pub const MAX_CHUNK_SIZE: u64 = 100_000;
    pub const MIN_CHUNK_SIZE: u64 = 10;

    pub const LEASE_DURATION_MS: u64 = 30_000;
    pub const POLL_TIMEOUT_MS: u64 = 5_000;
    pub const POLL_INTERVAL_MS: u64 = 50;

    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BACKOFF_BASE_MS: u64 = 1_000;
    pub const BACKOFF_CAP_MS: u64 = 300_000;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;

    pub const WORKER_CONCURRENCY: usize = 2;
    pub const MAX_JOB_DURATION_MS: u64 = 600_000;
    pub const UNAVAILABLE_BACKOFF_BASE_MS: u64 = 250;
    pub const UNAVAILABLE_BACKOFF_CAP_MS: u64 = 30_000;
    pub const SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

    pub const ERROR_SAMPLE_CAPACITY: usize = 10;

    pub const PRESSURE_LATENCY_THRESHOLD_MS: u64 = 250;
    pub const PRESSURE_WINDOW_SIZE: usize = 50;
    pub const PRESSURE_SUSTAINED_WINDOWS: u32 = 3;
    pub const PRESSURE_REDUCTION_FACTOR: f64 = 0.5;

    pub const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
    pub const CIRCUIT_TIMEOUT_MS: u64 = 10_000;
    pub const CIRCUIT_SUCCESS_THRESHOLD: u32 = 2;

    pub const DATABASE_MAX_CONNECTIONS: u32 = 10;
}

/// Hard limits enforced by config validation
pub mod limits {
    /// Per-process concurrency above this is rejected outright
    pub const MAX_WORKER_CONCURRENCY: usize = 16;
    /// Per-process concurrency above this is accepted with a warning
    pub const RECOMMENDED_WORKER_CONCURRENCY: usize = 5;
    pub const MAX_ATTEMPTS_LIMIT: u32 = 25;
}

/// PostgreSQL table names
pub mod tables {
    pub const MANIFESTS: &str = "tasker_batch_manifests";
    pub const JOBS: &str = "tasker_batch_jobs";
    pub const PROGRESS: &str = "tasker_batch_progress";
    pub const ERROR_SAMPLES: &str = "tasker_batch_error_samples";
    pub const DEAD_LETTERS: &str = "tasker_batch_dead_letters";
}

/// Environment variables consulted outside the config loader
pub mod env {
    pub const ENVIRONMENT: &str = "TASKER_ENV";
    pub const APP_ENVIRONMENT: &str = "APP_ENV";
    pub const CONFIG_PATH: &str = "TASKER_BATCH_CONFIG_PATH";
    pub const CONFIG_PREFIX: &str = "TASKER_BATCH";
    pub const LOG_FORMAT: &str = "TASKER_BATCH_LOG_FORMAT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
}

pub const DEFAULT_QUEUE_NAME: &str = "batch_jobs";
