//! # Progress Tracking
//!
//! Per-batch counters that are the single source of truth for "how much of
//! this batch is done". Workers never infer global progress locally.
//!
//! Every mutation is one atomic operation against the store. `transfer` moves
//! one unit between counters in a single step, so
//! `succeeded + failed + dead_lettered <= job_count` holds at every instant.

pub mod in_memory;

pub use in_memory::InMemoryProgressTracker;

use crate::error::Result;
use crate::models::{BatchId, BatchManifest, ErrorSample, ProgressKind, ProgressRecord};
use async_trait::async_trait;

#[async_trait]
pub trait ProgressTracker: Send + Sync + 'static {
    /// Create the record for a new manifest. Creating an existing record is a no-op.
    async fn create(&self, manifest: &BatchManifest) -> Result<()>;

    /// Atomically add one to `kind`; returns the new counter value
    async fn increment(&self, batch_id: BatchId, kind: ProgressKind) -> Result<u64>;

    /// Atomically move one unit from `from` to `to`
    async fn transfer(&self, batch_id: BatchId, from: ProgressKind, to: ProgressKind)
        -> Result<()>;

    /// Atomically subtract one from `kind`; returns the new counter value.
    /// Fails with `StateTransition` when the counter is already zero.
    async fn decrement(&self, batch_id: BatchId, kind: ProgressKind) -> Result<u64>;

    /// Append to the bounded error sample ring
    async fn record_error(&self, batch_id: BatchId, sample: ErrorSample) -> Result<()>;

    /// Point-in-time read
    async fn snapshot(&self, batch_id: BatchId) -> Result<ProgressRecord>;

    /// Mark a terminal record archived; it stays readable
    async fn archive(&self, batch_id: BatchId) -> Result<()>;

    async fn is_terminal(&self, batch_id: BatchId) -> Result<bool> {
        Ok(self.snapshot(batch_id).await?.is_terminal())
    }
}
