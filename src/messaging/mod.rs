//! # Messaging
//!
//! The queue client contract and its providers.
//!
//! Any backend exposing the five lease primitives (`enqueue`, `dequeue`, `ack`,
//! `nack`, `extend_lease`) can drive workers. Delivery is at-least-once: a
//! lease that is not acked or nacked before it expires makes the job
//! deliverable again, and the expired token can no longer settle it.
//!
//! ## Providers
//!
//! - [`InMemoryJobQueue`]: process-local queue for tests and single-process runs
//! - [`ProtectedJobQueue`]: circuit-breaker wrapper around any provider
//! - `database::PgJobQueue`: PostgreSQL-backed queue using `FOR UPDATE SKIP LOCKED`

pub mod in_memory;
pub mod protected;
pub mod traits;
pub mod types;

pub use in_memory::InMemoryJobQueue;
pub use protected::ProtectedJobQueue;
pub use traits::JobQueue;
pub use types::{EnqueueOutcome, Lease, LeaseToken, LeasedJob, QueueStats};
