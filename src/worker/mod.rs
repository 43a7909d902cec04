//! # Worker
//!
//! Leases jobs from a [`JobQueue`](crate::messaging::JobQueue), runs the
//! caller-supplied [`ChunkHandler`] on each one and settles the outcome:
//! ack + progress on success, nack with backoff on retryable failure, ack +
//! dead-letter once a job is poison or out of attempts.
//!
//! A worker runs a small, fixed number of concurrent slots. Throughput is
//! scaled by starting more workers, not by raising per-worker concurrency.

pub mod builder;
pub mod handler;
pub mod stats;
#[allow(clippy::module_inception)]
pub mod worker;

pub use builder::WorkerBuilder;
pub use handler::{handler_fn, ChunkHandler, FnChunkHandler};
pub use stats::{WorkerStats, WorkerStatsSnapshot};
pub use worker::{Worker, WorkerHandle};
