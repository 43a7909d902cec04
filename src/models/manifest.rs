//! # Batch Manifest
//!
//! Describes one submission of N records: how it was chunked and how many jobs
//! the batch must drive to a terminal state. Immutable once created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for BatchId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// The record set a batch is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchSource {
    /// Records addressed by position `[0, total)`
    Count { total: u64 },
    /// Records addressed by opaque identifiers
    Records { ids: Vec<String> },
}

impl BatchSource {
    pub fn count(total: u64) -> Self {
        Self::Count { total }
    }

    pub fn records<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Records {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn total_records(&self) -> u64 {
        match self {
            Self::Count { total } => *total,
            Self::Records { ids } => ids.len() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchManifest {
    pub batch_id: BatchId,
    pub total_records: u64,
    pub chunk_size: u64,
    pub job_count: u64,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl BatchManifest {
    /// Build a manifest; `chunk_size` must already be validated as non-zero
    pub(crate) fn new(total_records: u64, chunk_size: u64, max_attempts: u32) -> Self {
        Self {
            batch_id: BatchId::new(),
            total_records,
            chunk_size,
            job_count: total_records.div_ceil(chunk_size),
            max_attempts,
            created_at: Utc::now(),
        }
    }

    /// Size of the chunk at `index`; the last chunk may be short
    pub fn chunk_len(&self, index: u64) -> u64 {
        let start = index.saturating_mul(self.chunk_size);
        if start >= self.total_records {
            return 0;
        }
        (self.total_records - start).min(self.chunk_size)
    }

    pub fn is_empty(&self) -> bool {
        self.job_count == 0
    }
}
