//! # In-Memory Job Queue
//!
//! Process-local lease queue for tests, development and single-process runs.
//!
//! ## Features
//!
//! - **Leases**: a dequeued job stays invisible until its lease expires or it
//!   is settled; every delivery mints a new token
//! - **Delayed redelivery**: `nack` hides the job for the requested delay
//! - **Idempotent enqueue**: keyed by `(job_id, replay_generation)`
//! - **Fault injection**: [`InMemoryJobQueue::set_available`] and
//!   [`InMemoryJobQueue::force_expire`] simulate outages and lost workers

use super::traits::JobQueue;
use super::types::{chrono_duration, EnqueueOutcome, Lease, LeaseToken, LeasedJob, QueueStats};
use crate::config::QueueConfig;
use crate::constants::defaults;
use crate::error::{BatchError, Result};
use crate::models::{Job, JobId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

const PROVIDER_NAME: &str = "in_memory";

#[derive(Debug, Clone)]
struct QueueEntry {
    job: Job,
    /// Not deliverable before this instant
    visible_at: DateTime<Utc>,
    lease: Option<Lease>,
    delivery_count: u32,
}

impl QueueEntry {
    fn is_deliverable(&self, now: DateTime<Utc>) -> bool {
        match &self.lease {
            Some(lease) => !lease.is_active_at(now),
            None => self.visible_at <= now,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    /// Outstanding jobs in enqueue order
    entries: VecDeque<QueueEntry>,
    /// Highest replay generation ever enqueued per job
    known: HashMap<JobId, u32>,
}

impl QueueState {
    fn position(&self, job_id: JobId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.job.job_id == job_id)
    }

    /// Index of the entry whose active lease matches `token`
    fn active_lease(&self, job_id: JobId, token: &LeaseToken, now: DateTime<Utc>) -> Result<usize> {
        let Some(index) = self.position(job_id) else {
            return if self.known.contains_key(&job_id) {
                Err(BatchError::lease_expired(job_id))
            } else {
                Err(BatchError::JobNotFound { job_id })
            };
        };

        match &self.entries[index].lease {
            Some(lease) if &lease.token == token && lease.is_active_at(now) => Ok(index),
            _ => Err(BatchError::lease_expired(job_id)),
        }
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    total_enqueued: AtomicU64,
    total_acked: AtomicU64,
    total_nacked: AtomicU64,
    total_redelivered: AtomicU64,
    total_stale_rejections: AtomicU64,
}

/// In-memory lease queue
///
/// # Example
///
/// ```rust
/// use tasker_batch::messaging::{InMemoryJobQueue, JobQueue};
/// use tasker_batch::partitioner::partition;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = InMemoryJobQueue::new();
/// let (_manifest, jobs) = partition(100, 50)?;
/// queue.enqueue_batch(&jobs).await?;
///
/// if let Some(leased) = queue.dequeue(Duration::from_secs(30)).await? {
///     queue.ack(leased.job_id(), leased.token()).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    poll_timeout: Duration,
    poll_interval: Duration,
    available: AtomicBool,
    counters: QueueCounters,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_poll_settings(
            Duration::from_millis(defaults::POLL_TIMEOUT_MS),
            Duration::from_millis(defaults::POLL_INTERVAL_MS),
        )
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::with_poll_settings(config.poll_timeout(), config.poll_interval())
    }

    pub fn with_poll_settings(poll_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            poll_timeout,
            poll_interval,
            available: AtomicBool::new(true),
            counters: QueueCounters::default(),
        }
    }

    /// Simulate backend connectivity loss (`false`) or recovery (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
        if available {
            self.notify.notify_waiters();
        }
    }

    /// Expire the job's current lease immediately, as if its worker died
    pub fn force_expire(&self, job_id: JobId) -> bool {
        let mut state = self.state.lock();
        let Some(index) = state.position(job_id) else {
            return false;
        };
        let expired = match state.entries[index].lease.as_mut() {
            Some(lease) => {
                lease.lease_expiry = Utc::now() - chrono::Duration::milliseconds(1);
                true
            }
            None => false,
        };
        drop(state);
        if expired {
            self.notify.notify_waiters();
        }
        expired
    }

    /// Current lease held on a job, if any
    pub fn current_lease(&self, job_id: JobId) -> Option<Lease> {
        let state = self.state.lock();
        state
            .position(job_id)
            .and_then(|index| state.entries[index].lease.clone())
    }

    /// Outstanding (not yet acked) job count
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self, operation: &str) -> Result<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(BatchError::queue_unavailable(
                operation,
                "in-memory queue marked unavailable",
            ))
        }
    }

    fn record_rejection(&self, result: &Result<usize>) {
        if matches!(result, Err(BatchError::LeaseExpired { .. })) {
            self.counters.total_stale_rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn insert(&self, state: &mut QueueState, job: &Job) -> EnqueueOutcome {
        if let Some(generation) = state.known.get(&job.job_id) {
            if *generation >= job.replay_generation {
                return EnqueueOutcome::Duplicate;
            }
        }

        // A newer generation supersedes any outstanding copy
        if let Some(index) = state.position(job.job_id) {
            state.entries.remove(index);
        }
        state.known.insert(job.job_id, job.replay_generation);
        state.entries.push_back(QueueEntry {
            job: job.clone(),
            visible_at: Utc::now(),
            lease: None,
            delivery_count: 0,
        });
        self.counters.total_enqueued.fetch_add(1, Ordering::Relaxed);
        EnqueueOutcome::Enqueued
    }

    fn try_lease(&self, lease_duration: Duration) -> Option<LeasedJob> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let entry = state
            .entries
            .iter_mut()
            .find(|entry| entry.is_deliverable(now))?;

        if entry.lease.is_some() {
            self.counters.total_redelivered.fetch_add(1, Ordering::Relaxed);
            warn!(
                job_id = %entry.job.job_id,
                delivery_count = entry.delivery_count,
                "⏰ Lease expired, redelivering job"
            );
        }

        entry.delivery_count += 1;
        let lease = Lease {
            job_id: entry.job.job_id,
            token: LeaseToken::generate(),
            leased_at: now,
            lease_expiry: now + chrono_duration(lease_duration),
            delivery_count: entry.delivery_count,
        };
        entry.lease = Some(lease.clone());

        Some(LeasedJob {
            job: entry.job.clone(),
            lease,
        })
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: &Job) -> Result<EnqueueOutcome> {
        self.ensure_available("enqueue")?;
        let outcome = {
            let mut state = self.state.lock();
            self.insert(&mut state, job)
        };
        if outcome == EnqueueOutcome::Enqueued {
            self.notify.notify_waiters();
        }
        debug!(job_id = %job.job_id, outcome = ?outcome, "📤 Enqueued job");
        Ok(outcome)
    }

    async fn enqueue_batch(&self, jobs: &[Job]) -> Result<Vec<EnqueueOutcome>> {
        self.ensure_available("enqueue_batch")?;
        let outcomes: Vec<EnqueueOutcome> = {
            let mut state = self.state.lock();
            jobs.iter().map(|job| self.insert(&mut state, job)).collect()
        };
        self.notify.notify_waiters();
        debug!(count = jobs.len(), "📤 Enqueued job batch");
        Ok(outcomes)
    }

    async fn dequeue(&self, lease_duration: Duration) -> Result<Option<LeasedJob>> {
        let deadline = Instant::now() + self.poll_timeout;

        loop {
            self.ensure_available("dequeue")?;

            // Register before checking so a concurrent enqueue is not missed
            let notified = self.notify.notified();

            if let Some(leased) = self.try_lease(lease_duration) {
                debug!(
                    job_id = %leased.job_id(),
                    delivery_count = leased.lease.delivery_count,
                    "📥 Leased job"
                );
                return Ok(Some(leased));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait = (deadline - now).min(self.poll_interval);

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn ack(&self, job_id: JobId, token: &LeaseToken) -> Result<()> {
        self.ensure_available("ack")?;
        let mut state = self.state.lock();
        let result = state.active_lease(job_id, token, Utc::now());
        self.record_rejection(&result);
        let index = result?;

        state.entries.remove(index);
        self.counters.total_acked.fetch_add(1, Ordering::Relaxed);
        debug!(job_id = %job_id, "✅ Acked job");
        Ok(())
    }

    async fn nack(&self, job_id: JobId, token: &LeaseToken, delay: Duration) -> Result<()> {
        self.ensure_available("nack")?;
        {
            let now = Utc::now();
            let mut state = self.state.lock();
            let result = state.active_lease(job_id, token, now);
            self.record_rejection(&result);
            let index = result?;

            let entry = &mut state.entries[index];
            entry.job.attempt = entry.job.attempt.saturating_add(1);
            entry.visible_at = now + chrono_duration(delay);
            entry.lease = None;
            debug!(
                job_id = %job_id,
                attempt = entry.job.attempt,
                delay_ms = delay.as_millis() as u64,
                "↩️ Nacked job"
            );
        }
        self.counters.total_nacked.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn extend_lease(
        &self,
        job_id: JobId,
        token: &LeaseToken,
        additional: Duration,
    ) -> Result<Lease> {
        self.ensure_available("extend_lease")?;
        let now = Utc::now();
        let mut state = self.state.lock();
        let result = state.active_lease(job_id, token, now);
        self.record_rejection(&result);
        let index = result?;

        let entry = &mut state.entries[index];
        let lease = entry
            .lease
            .as_mut()
            .ok_or_else(|| BatchError::lease_expired(job_id))?;
        lease.lease_expiry = now + chrono_duration(additional);
        debug!(job_id = %job_id, lease_expiry = %lease.lease_expiry, "⏳ Extended lease");
        Ok(lease.clone())
    }

    async fn stats(&self) -> Result<QueueStats> {
        self.ensure_available("stats")?;
        let now = Utc::now();
        let state = self.state.lock();

        let (mut ready, mut delayed, mut leased) = (0u64, 0u64, 0u64);
        for entry in &state.entries {
            match &entry.lease {
                Some(lease) if lease.is_active_at(now) => leased += 1,
                Some(_) => ready += 1,
                None if entry.visible_at > now => delayed += 1,
                None => ready += 1,
            }
        }

        let acked = self.counters.total_acked.load(Ordering::Relaxed);
        let mut stats = QueueStats::new(PROVIDER_NAME)
            .with_depths(ready, delayed, leased)
            .with_completed(acked);
        stats.total_enqueued = self.counters.total_enqueued.load(Ordering::Relaxed);
        stats.total_acked = acked;
        stats.total_nacked = self.counters.total_nacked.load(Ordering::Relaxed);
        stats.total_redelivered = self.counters.total_redelivered.load(Ordering::Relaxed);
        stats.total_stale_rejections = self.counters.total_stale_rejections.load(Ordering::Relaxed);
        Ok(stats)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.available.load(Ordering::Acquire))
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}
