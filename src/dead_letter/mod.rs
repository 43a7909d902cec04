//! # Dead-Letter Store
//!
//! Append-only record of jobs that permanently failed, one entry per job and
//! replay generation. Entries leave the open set only through explicit
//! replay, which marks them replayed and hands the job back to the queue with
//! a fresh attempt budget.
//!
//! The one exception is [`DeadLetterStore::retract`]: an entry written by a
//! worker whose lease expired before the job was acked describes an outcome
//! that never happened, and is withdrawn.

pub mod in_memory;

pub use in_memory::InMemoryDeadLetterStore;

use crate::error::Result;
use crate::models::{BatchId, DeadLetterEntry, JobId};
use async_trait::async_trait;

#[async_trait]
pub trait DeadLetterStore: Send + Sync + 'static {
    /// Append an entry. Returns `false` without writing when the job already
    /// has an entry of the same or a newer replay generation. A same-generation
    /// duplicate that is still open takes over the entry's lease token.
    async fn append(&self, entry: DeadLetterEntry) -> Result<bool>;

    /// Entry of the job's latest replay generation
    async fn get(&self, job_id: JobId) -> Result<Option<DeadLetterEntry>>;

    /// Every entry of a job, oldest generation first
    async fn history(&self, job_id: JobId) -> Result<Vec<DeadLetterEntry>>;

    /// Entries for a batch that have not been replayed
    async fn list(&self, batch_id: BatchId) -> Result<Vec<DeadLetterEntry>>;

    /// Mark the latest entry replayed and return it as it was before replay.
    /// Fails with `AlreadyReplayed` when it was replayed before.
    async fn mark_replayed(&self, job_id: JobId) -> Result<DeadLetterEntry>;

    /// Undo `mark_replayed` when the replayed job could not be enqueued
    async fn restore(&self, job_id: JobId) -> Result<()>;

    /// Withdraw the open entry of `replay_generation`. With a `lease_token`,
    /// only an entry last written under that lease is withdrawn. Returns
    /// whether an entry was removed.
    async fn retract(
        &self,
        job_id: JobId,
        replay_generation: u32,
        lease_token: Option<&str>,
    ) -> Result<bool>;

    async fn count(&self, batch_id: BatchId) -> Result<u64> {
        Ok(self.list(batch_id).await?.len() as u64)
    }
}
