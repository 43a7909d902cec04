//! # Resilience Module
//!
//! Circuit breaking for the queue backend. A backend that keeps failing is
//! cut off for a cool-down period; callers see `QueueUnavailable` and back off
//! instead of hammering it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_batch::config::CircuitBreakerConfig;
//! use tasker_batch::resilience::CircuitBreaker;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new("job_queue", CircuitBreakerConfig::default());
//!
//! let value = breaker
//!     .call(|| async { Ok::<_, std::io::Error>("leased") })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitBreakerMetrics, CircuitState};
