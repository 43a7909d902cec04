//! # Data Model
//!
//! Plain data types shared by every component: the immutable batch manifest,
//! jobs and their chunk payloads, per-batch progress, and dead-letter entries.
//!
//! ## Ownership
//!
//! - A [`Job`] is owned by the queue until leased, then by exactly one worker
//!   for the lease duration.
//! - A [`ProgressRecord`] is mutated only through atomic tracker operations.
//! - A [`DeadLetterEntry`] is append-only; the only mutation is marking it replayed.

pub mod dead_letter;
pub mod job;
pub mod manifest;
pub mod progress;

pub use dead_letter::DeadLetterEntry;
pub use job::{ChunkSpec, Job, JobId};
pub use manifest::{BatchId, BatchManifest, BatchSource};
pub use progress::{BatchStatus, ErrorSample, ErrorSampleBuffer, ProgressKind, ProgressRecord};
