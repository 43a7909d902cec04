//! # Queue Client Contract
//!
//! The minimal primitive set any durable job queue backend must expose.

use super::types::{EnqueueOutcome, Lease, LeaseToken, LeasedJob, QueueStats};
use crate::error::Result;
use crate::models::{Job, JobId};
use async_trait::async_trait;
use std::time::Duration;

/// Durable, lease-based job queue.
///
/// Implementations must guarantee:
/// - `enqueue` is idempotent per `(job_id, replay_generation)`
/// - at most one active lease per job at any instant
/// - an expired lease makes the job deliverable again
/// - `ack`/`nack`/`extend_lease` with an inactive lease fail with
///   [`BatchError::LeaseExpired`](crate::error::BatchError::LeaseExpired)
/// - backend connectivity problems surface as
///   [`BatchError::QueueUnavailable`](crate::error::BatchError::QueueUnavailable)
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Durably persist a job
    async fn enqueue(&self, job: &Job) -> Result<EnqueueOutcome>;

    /// Enqueue several jobs
    ///
    /// Default implementation enqueues one at a time. Providers should
    /// override with a batched write where possible.
    async fn enqueue_batch(&self, jobs: &[Job]) -> Result<Vec<EnqueueOutcome>> {
        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            outcomes.push(self.enqueue(job).await?);
        }
        Ok(outcomes)
    }

    /// Lease one deliverable job, blocking up to the provider's poll timeout.
    /// Returns `None` when nothing became deliverable in that time.
    async fn dequeue(&self, lease_duration: Duration) -> Result<Option<LeasedJob>>;

    /// Mark the job permanently complete; it is never delivered again
    async fn ack(&self, job_id: JobId, token: &LeaseToken) -> Result<()>;

    /// Return the job to the queue after `delay`, incrementing its attempt
    async fn nack(&self, job_id: JobId, token: &LeaseToken, delay: Duration) -> Result<()>;

    /// Push the lease expiry to `now + additional`
    async fn extend_lease(
        &self,
        job_id: JobId,
        token: &LeaseToken,
        additional: Duration,
    ) -> Result<Lease>;

    async fn stats(&self) -> Result<QueueStats>;

    async fn health_check(&self) -> Result<bool>;

    fn provider_name(&self) -> &'static str;
}
