//! # Queue Types
//!
//! Lease tokens, leased jobs and queue statistics shared by every provider.

use crate::models::{Job, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque proof of ownership for one delivery of a job.
///
/// Every delivery mints a fresh token, so a token from an expired lease can
/// never settle a later delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseToken(String);

impl LeaseToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for LeaseToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LeaseToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub job_id: JobId,
    pub token: LeaseToken,
    pub leased_at: DateTime<Utc>,
    pub lease_expiry: DateTime<Utc>,
    /// Deliveries of this job so far, including this one
    pub delivery_count: u32,
}

impl Lease {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.lease_expiry > now
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}

/// A job handed to a worker together with its lease
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub job: Job,
    pub lease: Lease,
}

impl LeasedJob {
    pub fn job_id(&self) -> JobId {
        self.job.job_id
    }

    pub fn token(&self) -> &LeaseToken {
        &self.lease.token
    }

    pub fn is_redelivery(&self) -> bool {
        self.lease.delivery_count > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Enqueued,
    /// Same job and replay generation already known; nothing was written
    Duplicate,
}

impl EnqueueOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Queue statistics for monitoring and pressure decisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub provider: String,
    /// Visible and not leased
    pub ready: u64,
    /// Waiting out a nack delay
    pub delayed: u64,
    /// Held under an active lease
    pub leased: u64,
    pub completed: u64,
    pub total_enqueued: u64,
    pub total_acked: u64,
    pub total_nacked: u64,
    pub total_redelivered: u64,
    pub total_stale_rejections: u64,
}

impl QueueStats {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    pub fn with_depths(mut self, ready: u64, delayed: u64, leased: u64) -> Self {
        self.ready = ready;
        self.delayed = delayed;
        self.leased = leased;
        self
    }

    pub fn with_completed(mut self, completed: u64) -> Self {
        self.completed = completed;
        self
    }

    /// Jobs not yet acked
    pub fn outstanding(&self) -> u64 {
        self.ready + self.delayed + self.leased
    }
}

/// Millisecond-precision conversion for lease arithmetic
pub(crate) fn chrono_duration(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(duration.as_millis().min(i64::MAX as u128) as i64)
}
