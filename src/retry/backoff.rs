use crate::config::{RetryConfig, WorkerConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capped exponential backoff: `min(base * multiplier^attempt, cap)`, at
/// millisecond resolution.
///
/// Delays are non-decreasing in `attempt` and never exceed `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub multiplier: f64,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration, multiplier: f64) -> Self {
        Self {
            base,
            cap,
            multiplier: multiplier.max(1.0),
        }
    }

    /// Retry delays between job attempts
    pub fn from_retry_config(config: &RetryConfig) -> Self {
        Self::new(
            config.backoff_base(),
            config.backoff_cap(),
            config.backoff_multiplier,
        )
    }

    /// Reconnect delays while the queue backend is unreachable
    pub fn for_unavailable_queue(config: &WorkerConfig) -> Self {
        Self::new(
            config.unavailable_backoff_base(),
            config.unavailable_backoff_cap(),
            2.0,
        )
    }

    /// Delay before the next execution after a failure at zero-based `attempt`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.base.as_millis() as f64 * self.multiplier.powi(exponent);
        if !millis.is_finite() || millis >= self.cap.as_millis() as f64 {
            return self.cap;
        }
        Duration::from_millis(millis.round() as u64).min(self.cap)
    }

    /// Delays for attempts `0..count`
    pub fn schedule(&self, count: u32) -> Vec<Duration> {
        (0..count).map(|attempt| self.delay_for_attempt(attempt)).collect()
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_retry_config(&RetryConfig::default())
    }
}
