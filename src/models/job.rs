//! # Job Model
//!
//! One chunk of a batch. `attempt` counts failed executions so far and only
//! grows, except when a dead-lettered job is explicitly replayed.

use super::BatchId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use uuid::Uuid;

/// Unique identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
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

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// The slice of the source record set a job covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkSpec {
    /// Half-open positional range `[start, end)`
    Range { start: u64, end: u64 },
    /// Explicit record identifiers starting at `offset` in the source list
    Records { offset: u64, ids: Vec<String> },
}

impl ChunkSpec {
    pub fn len(&self) -> u64 {
        match self {
            Self::Range { start, end } => end.saturating_sub(*start),
            Self::Records { ids, .. } => ids.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of this chunk within the source record set
    pub fn range(&self) -> Range<u64> {
        match self {
            Self::Range { start, end } => *start..*end,
            Self::Records { offset, ids } => *offset..*offset + ids.len() as u64,
        }
    }

    pub fn chunk_start(&self) -> u64 {
        self.range().start
    }

    pub fn chunk_end(&self) -> u64 {
        self.range().end
    }

    pub fn record_ids(&self) -> Option<&[String]> {
        match self {
            Self::Records { ids, .. } => Some(ids),
            Self::Range { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub batch_id: BatchId,
    /// Zero-based position of the chunk within its batch
    pub sequence: u64,
    pub chunk: ChunkSpec,
    pub attempt: u32,
    pub max_attempts: u32,
    /// Bumped on every dead-letter replay so the queue accepts the job again
    pub replay_generation: u32,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(batch_id: BatchId, sequence: u64, chunk: ChunkSpec, max_attempts: u32) -> Self {
        Self {
            job_id: JobId::new(),
            batch_id,
            sequence,
            chunk,
            attempt: 0,
            max_attempts,
            replay_generation: 0,
            created_at: Utc::now(),
        }
    }

    /// Attempts consumed once the current execution has failed
    pub fn attempts_made(&self) -> u32 {
        self.attempt.saturating_add(1)
    }

    /// Whether a failure of the current execution exhausts the attempt budget
    pub fn is_final_attempt(&self) -> bool {
        self.attempts_made() >= self.max_attempts
    }

    /// Whether this job has failed before and is currently counted as in retry
    pub fn is_retrying(&self) -> bool {
        self.attempt > 0
    }

    /// Copy prepared for dead-letter replay: attempts reset, new generation
    pub fn for_replay(&self) -> Self {
        Self {
            attempt: 0,
            replay_generation: self.replay_generation.saturating_add(1),
            ..self.clone()
        }
    }
}
