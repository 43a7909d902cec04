//! # PostgreSQL Backend
//!
//! sqlx implementations of the queue, progress tracker, dead-letter store and
//! batch registry. Every store shares one [`PgPool`](sqlx::PgPool); schema is
//! applied with [`DatabaseMigrations::run_all`].
//!
//! ## Guarantees
//!
//! - Leasing uses `FOR UPDATE SKIP LOCKED`, so concurrent workers never lease
//!   the same row
//! - Lease checks compare the token and `lease_expiry > NOW()` inside the same
//!   `UPDATE`, so a stale worker cannot settle a redelivered job
//! - Progress counters change through single `UPDATE ... SET x = x + n`
//!   statements guarded by the `observed <= job_count` invariant

pub mod connection;
pub mod dead_letter;
pub mod job_queue;
pub mod migrations;
pub mod progress;
pub mod registry;

pub use connection::DatabaseConnection;
pub use dead_letter::PgDeadLetterStore;
pub use job_queue::PgJobQueue;
pub use migrations::DatabaseMigrations;
pub use progress::PgProgressTracker;
pub use registry::PgBatchRegistry;

/// Postgres stores BIGINT as i64
pub(crate) fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

pub(crate) fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

pub(crate) fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or_default()
}
