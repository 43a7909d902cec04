//! # Resource-Pressure Advisor
//!
//! Collects queue round-trip latencies reported by workers and turns sustained
//! slowness into a recommendation to shrink `chunk_size` for batches that have
//! not been partitioned yet.
//!
//! The advisor only ever *recommends*. It holds no reference to any manifest and
//! cannot alter a batch that is already in flight.

use crate::config::PressureConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Chunk size recommendation for the next partition call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChunkSizeAdvice {
    /// Latency is within bounds; keep the current chunk size
    Maintain { chunk_size: u64 },
    /// Latency has been high for `hot_windows` consecutive windows
    Reduce {
        from: u64,
        to: u64,
        hot_windows: u32,
        observed_mean_ms: u64,
    },
}

impl ChunkSizeAdvice {
    pub fn chunk_size(&self) -> u64 {
        match self {
            Self::Maintain { chunk_size } => *chunk_size,
            Self::Reduce { to, .. } => *to,
        }
    }

    pub fn is_reduction(&self) -> bool {
        matches!(self, Self::Reduce { .. })
    }
}

/// Point-in-time view of the advisor's internal window state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureSnapshot {
    pub samples_in_window: usize,
    pub windows_evaluated: u64,
    pub consecutive_hot_windows: u32,
    pub last_window_mean_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct LatencyWindow {
    samples: Vec<Duration>,
    windows_evaluated: u64,
    consecutive_hot: u32,
    last_mean: Option<Duration>,
}

#[derive(Debug)]
pub struct PressureMonitor {
    config: PressureConfig,
    window: Mutex<LatencyWindow>,
}

impl PressureMonitor {
    pub fn new(config: PressureConfig) -> Self {
        info!(
            "🎛️ PRESSURE: Creating chunk-size advisor (enabled: {}, threshold: {}ms, window: {})",
            config.enabled, config.latency_threshold_ms, config.window_size
        );
        Self {
            config,
            window: Mutex::new(LatencyWindow::default()),
        }
    }

    pub fn config(&self) -> &PressureConfig {
        &self.config
    }

    /// Record one dequeue/ack/nack round trip
    pub fn record_latency(&self, operation: &str, latency: Duration) {
        if !self.config.enabled {
            return;
        }

        let window_size = self.config.window_size.max(1);
        let mut window = self.window.lock();
        window.samples.push(latency);
        if window.samples.len() < window_size {
            return;
        }

        let total: Duration = window.samples.iter().sum();
        let mean = total / window.samples.len() as u32;
        window.samples.clear();
        window.windows_evaluated += 1;
        window.last_mean = Some(mean);

        if mean > self.config.latency_threshold() {
            window.consecutive_hot += 1;
            debug!(
                operation = %operation,
                mean_ms = mean.as_millis() as u64,
                consecutive_hot = window.consecutive_hot,
                "🔥 PRESSURE: Latency window above threshold"
            );
        } else {
            window.consecutive_hot = 0;
        }
    }

    /// Advice for partitioning a new batch whose caller would otherwise use
    /// `current_chunk_size`
    pub fn advice(&self, current_chunk_size: u64) -> ChunkSizeAdvice {
        let (hot, mean) = {
            let window = self.window.lock();
            (window.consecutive_hot, window.last_mean)
        };
        let sustained = self.config.sustained_windows.max(1);

        if !self.config.enabled || hot < sustained {
            return ChunkSizeAdvice::Maintain {
                chunk_size: current_chunk_size,
            };
        }

        // One reduction step per full run of sustained hot windows
        let steps = (hot / sustained) as i32;
        let factor = self.config.reduction_factor.clamp(0.0, 1.0).powi(steps);
        let reduced = (current_chunk_size as f64 * factor).floor() as u64;
        let floor = self.config.min_chunk_size.max(1);
        let to = reduced.max(floor).min(current_chunk_size);

        if to == current_chunk_size {
            return ChunkSizeAdvice::Maintain {
                chunk_size: current_chunk_size,
            };
        }

        let observed_mean_ms = mean.map(|m| m.as_millis() as u64).unwrap_or_default();
        info!(
            from = current_chunk_size,
            to = to,
            hot_windows = hot,
            observed_mean_ms = observed_mean_ms,
            "🎛️ PRESSURE: Recommending smaller chunk size for future batches"
        );
        ChunkSizeAdvice::Reduce {
            from: current_chunk_size,
            to,
            hot_windows: hot,
            observed_mean_ms,
        }
    }

    pub fn recommended_chunk_size(&self, current_chunk_size: u64) -> u64 {
        self.advice(current_chunk_size).chunk_size()
    }

    pub fn snapshot(&self) -> PressureSnapshot {
        let window = self.window.lock();
        PressureSnapshot {
            samples_in_window: window.samples.len(),
            windows_evaluated: window.windows_evaluated,
            consecutive_hot_windows: window.consecutive_hot,
            last_window_mean_ms: window.last_mean.map(|m| m.as_millis() as u64),
        }
    }

    pub fn reset(&self) {
        *self.window.lock() = LatencyWindow::default();
    }
}

impl Default for PressureMonitor {
    fn default() -> Self {
        Self::new(PressureConfig::default())
    }
}
