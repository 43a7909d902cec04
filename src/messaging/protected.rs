//! # Circuit Breaker Protected Job Queue
//!
//! Wraps any [`JobQueue`] with circuit breaker protection. Only backend
//! unavailability trips the breaker; stale leases and missing jobs are ordinary
//! answers from a healthy backend and pass straight through.

use super::traits::JobQueue;
use super::types::{EnqueueOutcome, Lease, LeaseToken, LeasedJob, QueueStats};
use crate::config::CircuitBreakerConfig;
use crate::error::{BatchError, Result};
use crate::models::{Job, JobId};
use crate::resilience::{CircuitBreaker, CircuitBreakerError, CircuitState};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug)]
pub struct ProtectedJobQueue<Q: JobQueue> {
    inner: Arc<Q>,
    breaker: CircuitBreaker,
}

impl<Q: JobQueue> ProtectedJobQueue<Q> {
    pub fn new(inner: Arc<Q>, config: CircuitBreakerConfig) -> Self {
        let breaker = CircuitBreaker::new(format!("job_queue:{}", inner.provider_name()), config);
        Self { inner, breaker }
    }

    pub fn inner(&self) -> &Arc<Q> {
        &self.inner
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn protected<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = self
            .breaker
            .call(|| async {
                match call().await {
                    Err(err) if err.is_unavailable() => Err(err),
                    other => Ok(other),
                }
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(CircuitBreakerError::OperationFailed(err)) => Err(err),
            Err(CircuitBreakerError::CircuitOpen { component }) => {
                warn!(component = %component, operation = %operation, "⚡ Queue call rejected by open circuit");
                Err(BatchError::queue_unavailable(
                    operation,
                    format!("circuit breaker open for {component}"),
                ))
            }
        }
    }
}

#[async_trait]
impl<Q: JobQueue> JobQueue for ProtectedJobQueue<Q> {
    async fn enqueue(&self, job: &Job) -> Result<EnqueueOutcome> {
        self.protected("enqueue", || self.inner.enqueue(job)).await
    }

    async fn enqueue_batch(&self, jobs: &[Job]) -> Result<Vec<EnqueueOutcome>> {
        self.protected("enqueue_batch", || self.inner.enqueue_batch(jobs))
            .await
    }

    async fn dequeue(&self, lease_duration: Duration) -> Result<Option<LeasedJob>> {
        self.protected("dequeue", || self.inner.dequeue(lease_duration))
            .await
    }

    async fn ack(&self, job_id: JobId, token: &LeaseToken) -> Result<()> {
        self.protected("ack", || self.inner.ack(job_id, token)).await
    }

    async fn nack(&self, job_id: JobId, token: &LeaseToken, delay: Duration) -> Result<()> {
        self.protected("nack", || self.inner.nack(job_id, token, delay))
            .await
    }

    async fn extend_lease(
        &self,
        job_id: JobId,
        token: &LeaseToken,
        additional: Duration,
    ) -> Result<Lease> {
        self.protected("extend_lease", || {
            self.inner.extend_lease(job_id, token, additional)
        })
        .await
    }

    async fn stats(&self) -> Result<QueueStats> {
        self.protected("stats", || self.inner.stats()).await
    }

    async fn health_check(&self) -> Result<bool> {
        if self.breaker.state() == CircuitState::Open {
            return Ok(false);
        }
        self.inner.health_check().await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}
