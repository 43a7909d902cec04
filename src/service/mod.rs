//! # Batch Service
//!
//! The submit/status/replay surface of the engine.
//!
//! ## Overview
//!
//! [`BatchService`] owns no workers. It partitions and enqueues batches, answers
//! status queries from the progress tracker, and moves dead-lettered jobs back
//! into the queue on request. Workers are started separately, usually in other
//! processes, against the same backends.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_batch::config::BatchConfig;
//! use tasker_batch::models::BatchSource;
//! use tasker_batch::service::InMemoryBackends;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BatchConfig::default();
//! let backends = InMemoryBackends::new(&config);
//! let service = backends.service(config.clone())?;
//!
//! let manifest = service.create_batch(BatchSource::count(10_000), Some(500), None).await?;
//! let status = service
//!     .wait_for_terminal(manifest.batch_id, Duration::from_millis(100), Duration::from_secs(60))
//!     .await?;
//! println!("{} of {} jobs succeeded", status.succeeded, status.total);
//! # Ok(())
//! # }
//! ```

pub mod in_memory;

pub use in_memory::InMemoryBackends;

use crate::config::BatchConfig;
use crate::dead_letter::DeadLetterStore;
use crate::error::{BatchError, Result};
use crate::logging::log_batch_operation;
use crate::messaging::{JobQueue, QueueStats};
use crate::models::{
    BatchId, BatchManifest, BatchSource, BatchStatus, DeadLetterEntry, Job, JobId, ProgressKind,
    ProgressRecord,
};
use crate::partitioner::{PartitionPlan, Partitioner};
use crate::pressure::{ChunkSizeAdvice, PressureMonitor};
use crate::progress::ProgressTracker;
use crate::registry::BatchRegistry;
use crate::worker::WorkerBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

pub struct BatchService {
    config: BatchConfig,
    queue: Arc<dyn JobQueue>,
    progress: Arc<dyn ProgressTracker>,
    dead_letters: Arc<dyn DeadLetterStore>,
    registry: Arc<dyn BatchRegistry>,
    pressure: Arc<PressureMonitor>,
}

impl std::fmt::Debug for BatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchService")
            .field("queue", &self.queue.provider_name())
            .field("pressure", &self.pressure.snapshot())
            .finish()
    }
}

impl BatchService {
    pub fn new(
        config: BatchConfig,
        queue: Arc<dyn JobQueue>,
        progress: Arc<dyn ProgressTracker>,
        dead_letters: Arc<dyn DeadLetterStore>,
        registry: Arc<dyn BatchRegistry>,
        pressure: Arc<PressureMonitor>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            queue,
            progress,
            dead_letters,
            registry,
            pressure,
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn pressure(&self) -> &Arc<PressureMonitor> {
        &self.pressure
    }

    /// A worker builder wired to this service's backends and pressure monitor.
    /// Callers still supply the handler and classifier.
    pub fn worker_builder(&self) -> WorkerBuilder {
        WorkerBuilder::new(self.config.clone())
            .queue(Arc::clone(&self.queue))
            .progress(Arc::clone(&self.progress))
            .dead_letters(Arc::clone(&self.dead_letters))
            .registry(Arc::clone(&self.registry))
            .pressure(Arc::clone(&self.pressure))
    }

    /// Chunk size for a new batch: the explicit value, else the configured
    /// default adjusted by the pressure advisor
    pub fn resolve_chunk_size(&self, chunk_size: Option<u64>) -> u64 {
        chunk_size.unwrap_or_else(|| {
            self.pressure
                .recommended_chunk_size(self.config.partition.default_chunk_size)
        })
    }

    pub fn chunk_size_advice(&self) -> ChunkSizeAdvice {
        self.pressure
            .advice(self.config.partition.default_chunk_size)
    }

    /// Partition without registering or enqueueing anything
    pub fn plan_batch(
        &self,
        source: &BatchSource,
        chunk_size: Option<u64>,
        max_attempts: Option<u32>,
    ) -> Result<PartitionPlan> {
        let partitioner = Partitioner::new(max_attempts.unwrap_or(self.config.retry.max_attempts))
            .with_max_chunk_size(self.config.partition.max_chunk_size);
        let plan = partitioner.plan(source, self.resolve_chunk_size(chunk_size))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Partition, register and enqueue a batch.
    ///
    /// The manifest and progress record exist before the first job is
    /// visible, so a worker never leases a job of an unknown batch.
    #[instrument(skip(self, source), fields(total_records = source.total_records()))]
    pub async fn create_batch(
        &self,
        source: BatchSource,
        chunk_size: Option<u64>,
        max_attempts: Option<u32>,
    ) -> Result<BatchManifest> {
        let (manifest, jobs) = self
            .plan_batch(&source, chunk_size, max_attempts)?
            .into_parts();
        let batch_id = manifest.batch_id.to_string();

        self.registry.register(&manifest).await?;
        self.progress.create(&manifest).await?;

        let outcomes = self.queue.enqueue_batch(&jobs).await.map_err(|err| {
            error!(batch_id = %batch_id, error = %err, "❌ Failed to enqueue batch jobs");
            err
        })?;
        let duplicates = outcomes.iter().filter(|outcome| outcome.is_duplicate()).count();
        if duplicates > 0 {
            warn!(batch_id = %batch_id, duplicates = duplicates, "⚠️ Some jobs were already enqueued");
        }

        log_batch_operation(
            "create",
            Some(&batch_id),
            Some(manifest.job_count),
            "enqueued",
            Some(&format!(
                "{} records in chunks of {}",
                manifest.total_records, manifest.chunk_size
            )),
        );
        Ok(manifest)
    }

    pub async fn get_manifest(&self, batch_id: BatchId) -> Result<BatchManifest> {
        Ok(self.registry.get(batch_id).await?.manifest)
    }

    /// Current counters and terminal flag. A terminal batch is archived on
    /// first observation.
    pub async fn get_batch_status(&self, batch_id: BatchId) -> Result<BatchStatus> {
        let registered = self.registry.get(batch_id).await?;
        let progress = self.progress.snapshot(batch_id).await?;

        if progress.is_terminal() && progress.archived_at.is_none() {
            if let Err(err) = self.progress.archive(batch_id).await {
                // Lost a race with a replay; the batch is open again
                debug!(batch_id = %batch_id, error = %err, "Archive skipped");
            }
        }

        Ok(BatchStatus::from_progress(&progress, registered.is_cancelled()))
    }

    /// Full progress record including recent error samples
    pub async fn get_progress(&self, batch_id: BatchId) -> Result<ProgressRecord> {
        self.progress.snapshot(batch_id).await
    }

    /// Move a dead-lettered job back into the queue with a fresh attempt
    /// budget and the next replay generation
    #[instrument(skip(self))]
    pub async fn requeue_dead_letter(&self, job_id: JobId) -> Result<Job> {
        let entry = self.dead_letters.mark_replayed(job_id).await?;
        let batch_id = entry.batch_id;
        // An entry without a counted dead-lettered unit must not reopen the batch
        if let Err(err) = self
            .progress
            .decrement(batch_id, ProgressKind::DeadLettered)
            .await
        {
            error!(job_id = %job_id, error = %err, "❌ No dead-lettered unit to release; replay refused");
            if let Err(restore_err) = self.dead_letters.restore(job_id).await {
                error!(job_id = %job_id, error = %restore_err, "❌ Failed to restore dead-letter entry");
            }
            return Err(err);
        }

        let job = entry.job.for_replay();
        if let Err(err) = self.queue.enqueue(&job).await {
            error!(job_id = %job_id, error = %err, "❌ Replay enqueue failed; restoring dead-letter entry");
            if let Err(restore_err) = self.restore_dead_letter(&entry).await {
                error!(job_id = %job_id, error = %restore_err, "❌ Failed to restore dead-letter entry");
            }
            return Err(err);
        }

        info!(
            job_id = %job_id,
            batch_id = %batch_id,
            replay_generation = job.replay_generation,
            "♻️ Dead-lettered job requeued"
        );
        Ok(job)
    }

    async fn restore_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()> {
        self.dead_letters.restore(entry.job_id).await?;
        self.progress
            .increment(entry.batch_id, ProgressKind::DeadLettered)
            .await?;
        Ok(())
    }

    /// Unreplayed dead-letter entries for a batch, in chunk order
    pub async fn list_dead_letters(&self, batch_id: BatchId) -> Result<Vec<DeadLetterEntry>> {
        self.dead_letters.list(batch_id).await
    }

    /// Stop starting new jobs of this batch. Jobs already processing finish
    /// normally; the rest are skipped by workers.
    pub async fn cancel_batch(&self, batch_id: BatchId) -> Result<bool> {
        let cancelled = self.registry.cancel(batch_id).await?;
        if cancelled {
            log_batch_operation("cancel", Some(&batch_id.to_string()), None, "cancelled", None);
        }
        Ok(cancelled)
    }

    /// Poll status until the batch is terminal or `timeout` elapses
    pub async fn wait_for_terminal(
        &self,
        batch_id: BatchId,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<BatchStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.get_batch_status(batch_id).await?;
            if status.terminal {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                return Err(BatchError::Timeout {
                    operation: format!("wait_for_terminal({batch_id})"),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.queue.stats().await
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.queue.health_check().await
    }
}
