use super::{BatchId, Job, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job that permanently failed and waits for manual replay.
///
/// Entries are kept per `(job_id, replay_generation)`, so a job that fails
/// again after replay gains a new entry and the earlier one stays readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job_id: JobId,
    pub batch_id: BatchId,
    pub last_error: String,
    pub attempts_made: u32,
    /// Routed by the poison path rather than attempt exhaustion
    pub permanent: bool,
    /// Snapshot of the job as last executed, used for replay
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub replayed_at: Option<DateTime<Utc>>,
    /// Lease the entry was written under; only that lease may retract it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_token: Option<String>,
}

impl DeadLetterEntry {
    pub fn new(job: &Job, last_error: impl Into<String>, permanent: bool) -> Self {
        Self {
            job_id: job.job_id,
            batch_id: job.batch_id,
            last_error: last_error.into(),
            attempts_made: job.attempts_made(),
            permanent,
            job: job.clone(),
            dead_lettered_at: Utc::now(),
            replayed_at: None,
            lease_token: None,
        }
    }

    pub fn with_lease_token(mut self, lease_token: impl Into<String>) -> Self {
        self.lease_token = Some(lease_token.into());
        self
    }

    pub fn replay_generation(&self) -> u32 {
        self.job.replay_generation
    }

    pub fn is_replayed(&self) -> bool {
        self.replayed_at.is_some()
    }
}
