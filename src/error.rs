//! # Batch Error Types
//!
//! Structured error taxonomy for partitioning, queue leasing, processing and
//! progress tracking. Job-level errors are classified and routed by the worker;
//! they never crash a worker process.

use crate::models::{BatchId, JobId};
use thiserror::Error;

/// Errors surfaced by the batch engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    /// Bad partition or runtime parameters. Fatal at submit time, never retried.
    #[error("Invalid configuration: {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Job logic failed in a way that is expected to succeed on retry
    #[error("Transient processing error for job {job_id}: {message}")]
    TransientProcessing { job_id: JobId, message: String },

    /// Job logic determined that retrying is futile
    #[error("Permanent processing error for job {job_id}: {message}")]
    PermanentProcessing { job_id: JobId, message: String },

    /// ack/nack/extend attempted with a lease that is no longer active
    #[error("Lease expired or superseded for job {job_id}")]
    LeaseExpired { job_id: JobId },

    /// Backend connectivity failure or open circuit breaker
    #[error("Queue backend unavailable: {operation}: {message}")]
    QueueUnavailable { operation: String, message: String },

    #[error("Batch not found: {batch_id}")]
    BatchNotFound { batch_id: BatchId },

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: JobId },

    #[error("Dead-letter entry not found for job {job_id}")]
    DeadLetterNotFound { job_id: JobId },

    #[error("Dead-letter entry for job {job_id} was already replayed")]
    AlreadyReplayed { job_id: JobId },

    #[error("Invalid state transition: {message}")]
    StateTransition { message: String },

    #[error("Database error: {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Timed out waiting for {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl BatchError {
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn transient(job_id: JobId, message: impl Into<String>) -> Self {
        Self::TransientProcessing {
            job_id,
            message: message.into(),
        }
    }

    pub fn permanent(job_id: JobId, message: impl Into<String>) -> Self {
        Self::PermanentProcessing {
            job_id,
            message: message.into(),
        }
    }

    pub fn lease_expired(job_id: JobId) -> Self {
        Self::LeaseExpired { job_id }
    }

    pub fn queue_unavailable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueUnavailable {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn state_transition(message: impl Into<String>) -> Self {
        Self::StateTransition {
            message: message.into(),
        }
    }

    /// True for errors that indicate the backend could not be reached
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::QueueUnavailable { .. })
    }

    /// True for stale-lease rejections
    pub fn is_lease_expired(&self) -> bool {
        matches!(self, Self::LeaseExpired { .. })
    }
}

impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for BatchError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => Self::queue_unavailable("database", err.to_string()),
            _ => Self::database("query", err.to_string()),
        }
    }
}

impl From<config::ConfigError> for BatchError {
    fn from(err: config::ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Error returned by caller-supplied chunk processing logic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("transient: {message}")]
    Transient { message: String },

    #[error("permanent: {message}")]
    Permanent { message: String },
}

impl ProcessingError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient { message } | Self::Permanent { message } => message,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }

    /// Lift into the crate taxonomy for the given job
    pub fn into_batch_error(self, job_id: JobId) -> BatchError {
        match self {
            Self::Transient { message } => BatchError::transient(job_id, message),
            Self::Permanent { message } => BatchError::permanent(job_id, message),
        }
    }
}

impl From<anyhow::Error> for ProcessingError {
    fn from(err: anyhow::Error) -> Self {
        Self::transient(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
