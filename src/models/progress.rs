//! # Progress Model
//!
//! Point-in-time view of a batch's counters plus the status shape returned to
//! callers.

use super::{BatchId, BatchManifest, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Counter selected by a tracker operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Succeeded,
    /// Jobs currently waiting on a retry
    Failed,
    DeadLettered,
}

impl fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

impl FromStr for ProgressKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "dead_lettered" => Ok(Self::DeadLettered),
            _ => Err(format!("Unknown progress kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSample {
    pub job_id: JobId,
    pub attempt: u32,
    pub message: String,
    pub permanent: bool,
    pub recorded_at: DateTime<Utc>,
}

impl ErrorSample {
    pub fn new(job_id: JobId, attempt: u32, message: impl Into<String>, permanent: bool) -> Self {
        Self {
            job_id,
            attempt,
            message: message.into(),
            permanent,
            recorded_at: Utc::now(),
        }
    }
}

/// Fixed-capacity ring buffer; pushing past capacity evicts the oldest sample
#[derive(Debug, Clone)]
pub struct ErrorSampleBuffer {
    capacity: usize,
    samples: VecDeque<ErrorSample>,
}

impl ErrorSampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: ErrorSample) {
        if self.capacity == 0 {
            return;
        }
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest first
    pub fn to_vec(&self) -> Vec<ErrorSample> {
        self.samples.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub batch_id: BatchId,
    pub job_count: u64,
    pub succeeded_count: u64,
    pub failed_count: u64,
    pub dead_lettered_count: u64,
    pub error_samples: Vec<ErrorSample>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    pub fn for_manifest(manifest: &BatchManifest) -> Self {
        let now = Utc::now();
        Self {
            batch_id: manifest.batch_id,
            job_count: manifest.job_count,
            succeeded_count: 0,
            failed_count: 0,
            dead_lettered_count: 0,
            error_samples: Vec::new(),
            created_at: now,
            updated_at: now,
            archived_at: None,
        }
    }

    /// Jobs in retry are still in flight and do not count
    pub fn is_terminal(&self) -> bool {
        self.succeeded_count + self.dead_lettered_count == self.job_count
    }

    pub fn observed_count(&self) -> u64 {
        self.succeeded_count + self.failed_count + self.dead_lettered_count
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.job_count == 0 {
            return 100.0;
        }
        (self.succeeded_count + self.dead_lettered_count) as f64 / self.job_count as f64 * 100.0
    }
}

/// Status API response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub batch_id: BatchId,
    pub total: u64,
    pub succeeded: u64,
    pub failed_in_retry: u64,
    pub dead_lettered: u64,
    pub terminal: bool,
    pub cancelled: bool,
}

impl BatchStatus {
    pub fn from_progress(progress: &ProgressRecord, cancelled: bool) -> Self {
        Self {
            batch_id: progress.batch_id,
            total: progress.job_count,
            succeeded: progress.succeeded_count,
            failed_in_retry: progress.failed_count,
            dead_lettered: progress.dead_lettered_count,
            terminal: progress.is_terminal(),
            cancelled,
        }
    }
}
