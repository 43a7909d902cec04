#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Batch
//!
//! Chunked batch-job distribution: split a large record set into bounded
//! chunks, fan them out to workers through a lease-based durable queue, track
//! progress atomically and recover from partial failure without losing or
//! double-counting work.
//!
//! ## Architecture
//!
//! ```text
//! BatchService::create_batch
//!   -> Partitioner (N records -> ceil(N/C) jobs)
//!   -> JobQueue::enqueue_batch
//!        |
//!        v
//! Worker slots: dequeue(lease) -> ChunkHandler::process
//!   success   -> ack  -> ProgressTracker (succeeded)
//!   retryable -> nack(backoff) -> redelivered later
//!   exhausted -> DeadLetterStore + ack -> ProgressTracker (dead_lettered)
//!        |
//!        v
//! BatchService::get_batch_status  (terminal when succeeded + dead_lettered == jobs)
//! ```
//!
//! Throughput scales by running more workers, not by raising per-worker
//! concurrency or chunk size. The [`pressure`] advisor watches queue round
//! trips and recommends smaller chunks for future batches when latency stays
//! high; it never touches a batch in flight.
//!
//! ## Module Organization
//!
//! - [`partitioner`] - Chunking of counts and record-id lists
//! - [`messaging`] - `JobQueue` contract, in-memory queue, circuit-breaker wrapper
//! - [`progress`] - Atomic per-batch counters and error samples
//! - [`dead_letter`] - Permanently failed jobs and replay
//! - [`registry`] - Batch manifests and cancellation
//! - [`retry`] - Backoff policy, failure classification, retry decisions
//! - [`state_machine`] - Per-delivery job lifecycle
//! - [`worker`] - Lease loop, heartbeat and settlement
//! - [`service`] - Submit, status, replay, cancel and wait
//! - [`database`] - PostgreSQL implementations of every store
//! - [`config`] / [`logging`] / [`error`] - Ambient configuration, tracing and errors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tasker_batch::config::BatchConfig;
//! use tasker_batch::models::{BatchSource, Job};
//! use tasker_batch::retry::ErrorKindClassifier;
//! use tasker_batch::service::InMemoryBackends;
//! use tasker_batch::worker::handler_fn;
//! use tasker_batch::ProcessingError;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! tasker_batch::logging::init_structured_logging();
//!
//! let config = BatchConfig::default();
//! let backends = InMemoryBackends::new(&config);
//! let service = backends.service(config)?;
//!
//! let worker = service
//!     .worker_builder()
//!     .handler(Arc::new(handler_fn("sum", |job: Job| async move {
//!         let _records = job.chunk.range();
//!         Ok::<(), ProcessingError>(())
//!     })))
//!     .classifier(Arc::new(ErrorKindClassifier))
//!     .build()?
//!     .start();
//!
//! let manifest = service.create_batch(BatchSource::count(10_000), Some(500), None).await?;
//! let status = service
//!     .wait_for_terminal(manifest.batch_id, Duration::from_millis(50), Duration::from_secs(30))
//!     .await?;
//! assert!(status.terminal);
//!
//! worker.shutdown(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
#[cfg(feature = "postgres")]
pub mod database;
pub mod dead_letter;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod partitioner;
pub mod pressure;
pub mod progress;
pub mod registry;
pub mod resilience;
pub mod retry;
pub mod service;
pub mod state_machine;
pub mod worker;

pub use config::{BatchConfig, ConfigLoader};
pub use error::{BatchError, ProcessingError, Result};
pub use messaging::{InMemoryJobQueue, JobQueue, LeaseToken, LeasedJob, ProtectedJobQueue};
pub use models::{
    BatchId, BatchManifest, BatchSource, BatchStatus, ChunkSpec, DeadLetterEntry, Job, JobId,
    ProgressKind, ProgressRecord,
};
pub use partitioner::{partition, partition_records, PartitionPlan, Partitioner};
pub use pressure::{ChunkSizeAdvice, PressureMonitor};
pub use progress::ProgressTracker;
pub use retry::{
    BackoffPolicy, ErrorKindClassifier, FailureClassifier, RetryAllClassifier, RetryController,
};
pub use service::{BatchService, InMemoryBackends};
pub use worker::{ChunkHandler, Worker, WorkerBuilder, WorkerHandle};
