//! # Circuit Breaker
//!
//! Classic three-state breaker: Closed (normal), Open (failing fast) and
//! Half-Open (probing recovery).

use crate::config::CircuitBreakerConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub half_open_calls: u64,
    pub rejected_calls: u64,
    pub total_duration: Duration,
    pub current_state: CircuitState,
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            half_open_calls: 0,
            rejected_calls: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
        }
    }
}

impl CircuitBreakerMetrics {
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.failure_count as f64 / self.total_calls as f64
    }
}

#[derive(Debug, Default)]
struct BreakerInner {
    metrics: CircuitBreakerMetrics,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_ms = config.timeout_ms,
            success_threshold = config.success_threshold,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// Only `Err` results count as failures; callers that want to pass business
    /// errors through without tripping the breaker return them inside `Ok`.
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.should_allow_call() {
            self.inner.lock().metrics.rejected_calls += 1;
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let started = Instant::now();
        let result = operation().await;
        let duration = started.elapsed();

        match &result {
            Ok(_) => self.record_success(duration),
            Err(_) => self.record_failure(duration),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    fn should_allow_call(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = self.inner.lock().opened_at;
                match opened_at {
                    Some(opened) if opened.elapsed() >= self.config.timeout() => {
                        self.transition_to_half_open();
                        true
                    }
                    Some(_) => false,
                    None => {
                        warn!(component = %self.name, "⚠️ Circuit open but no timestamp recorded");
                        true
                    }
                }
            }
            CircuitState::HalfOpen => {
                let inner = self.inner.lock();
                inner.metrics.half_open_calls < u64::from(self.config.success_threshold)
            }
        }
    }

    fn record_success(&self, duration: Duration) {
        let close = {
            let mut inner = self.inner.lock();
            let metrics = &mut inner.metrics;
            metrics.total_calls += 1;
            metrics.success_count += 1;
            metrics.total_duration += duration;

            match self.state() {
                CircuitState::HalfOpen => {
                    metrics.half_open_calls += 1;
                    metrics.half_open_calls >= u64::from(self.config.success_threshold)
                }
                CircuitState::Closed => {
                    metrics.consecutive_failures = 0;
                    false
                }
                CircuitState::Open => false,
            }
        };

        debug!(component = %self.name, duration_ms = duration.as_millis() as u64, "🟢 Operation succeeded");
        if close {
            self.transition_to_closed();
        }
    }

    fn record_failure(&self, duration: Duration) {
        let open = {
            let mut inner = self.inner.lock();
            let metrics = &mut inner.metrics;
            metrics.total_calls += 1;
            metrics.failure_count += 1;
            metrics.total_duration += duration;

            match self.state() {
                CircuitState::Closed => {
                    metrics.consecutive_failures += 1;
                    metrics.consecutive_failures >= u64::from(self.config.failure_threshold)
                }
                CircuitState::HalfOpen => true,
                CircuitState::Open => false,
            }
        };

        warn!(component = %self.name, duration_ms = duration.as_millis() as u64, "🔴 Operation failed");
        if open {
            self.transition_to_open();
        }
    }

    fn transition_to_closed(&self) {
        self.state.store(CircuitState::Closed as u8, Ordering::Release);
        let mut inner = self.inner.lock();
        inner.metrics.consecutive_failures = 0;
        inner.metrics.half_open_calls = 0;
        inner.opened_at = None;
        info!(component = %self.name, total_calls = inner.metrics.total_calls, "🟢 Circuit breaker closed (recovered)");
    }

    fn transition_to_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        let mut inner = self.inner.lock();
        inner.opened_at = Some(Instant::now());
        inner.metrics.half_open_calls = 0;
        error!(
            component = %self.name,
            consecutive_failures = inner.metrics.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            timeout_ms = self.config.timeout_ms,
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    fn transition_to_half_open(&self) {
        self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);
        self.inner.lock().metrics.half_open_calls = 0;
        info!(component = %self.name, success_threshold = self.config.success_threshold, "🟡 Circuit breaker half-open (testing recovery)");
    }

    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        self.transition_to_open();
    }

    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        self.transition_to_closed();
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let mut snapshot = self.inner.lock().metrics.clone();
        snapshot.current_state = self.state();
        snapshot
    }
}
