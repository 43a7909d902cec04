use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-worker counters. Diagnostic only; batch progress lives in the
/// [`ProgressTracker`](crate::progress::ProgressTracker).
#[derive(Debug, Default)]
pub struct WorkerStats {
    leased: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    skipped_cancelled: AtomicU64,
    stale_leases: AtomicU64,
    queue_unavailable: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatsSnapshot {
    pub leased: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub skipped_cancelled: u64,
    /// Results discarded because the lease had expired before settlement
    pub stale_leases: u64,
    pub queue_unavailable: u64,
}

impl WorkerStats {
    pub(crate) fn record_leased(&self) {
        self.leased.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_lease(&self) {
        self.stale_leases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queue_unavailable(&self) {
        self.queue_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            leased: self.leased.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            skipped_cancelled: self.skipped_cancelled.load(Ordering::Relaxed),
            stale_leases: self.stale_leases.load(Ordering::Relaxed),
            queue_unavailable: self.queue_unavailable.load(Ordering::Relaxed),
        }
    }
}

impl WorkerStatsSnapshot {
    /// Jobs this worker settled, in any direction
    pub fn settled(&self) -> u64 {
        self.succeeded + self.retried + self.dead_lettered + self.skipped_cancelled
    }
}
