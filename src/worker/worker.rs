use super::handler::ChunkHandler;
use super::stats::{WorkerStats, WorkerStatsSnapshot};
use crate::config::{QueueConfig, WorkerConfig};
use crate::dead_letter::DeadLetterStore;
use crate::error::{BatchError, ProcessingError, Result};
use crate::logging::log_job_operation;
use crate::messaging::{JobQueue, LeaseToken, LeasedJob};
use crate::models::{DeadLetterEntry, ErrorSample, Job, ProgressKind};
use crate::pressure::PressureMonitor;
use crate::progress::ProgressTracker;
use crate::registry::BatchRegistry;
use crate::retry::{BackoffPolicy, RetryController, RetryDecision};
use crate::state_machine::{JobEvent, JobState, JobStateMachine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Pulls jobs from the queue and drives each through its
/// [`JobStateMachine`]. Build with [`WorkerBuilder`](super::WorkerBuilder).
pub struct Worker {
    pub(super) worker_id: String,
    pub(super) queue: Arc<dyn JobQueue>,
    pub(super) progress: Arc<dyn ProgressTracker>,
    pub(super) dead_letters: Arc<dyn DeadLetterStore>,
    pub(super) registry: Arc<dyn BatchRegistry>,
    pub(super) handler: Arc<dyn ChunkHandler>,
    pub(super) retry: RetryController,
    pub(super) pressure: Option<Arc<PressureMonitor>>,
    pub(super) queue_config: QueueConfig,
    pub(super) worker_config: WorkerConfig,
    pub(super) stats: Arc<WorkerStats>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("worker_id", &self.worker_id)
            .field("queue", &self.queue.provider_name())
            .field("handler", &self.handler.handler_name())
            .field("concurrency", &self.worker_config.concurrency)
            .finish()
    }
}

/// Outcome of running the handler under lease supervision
enum HandlerOutcome {
    Completed(std::result::Result<(), ProcessingError>),
    LeaseLost,
}

/// Shutdown signalling shared by every slot of one worker
#[derive(Debug)]
struct WorkerControl {
    running: AtomicBool,
    shutdown_notify: Notify,
}

impl WorkerControl {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Handle to a started worker
#[derive(Debug)]
pub struct WorkerHandle {
    worker_id: String,
    control: Arc<WorkerControl>,
    slots: Vec<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl WorkerHandle {
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running() && self.slots.iter().any(|slot| !slot.is_finished())
    }

    /// Stop leasing new jobs and wait for in-flight jobs to settle.
    ///
    /// Slots still busy after `timeout` are aborted; their leases expire and
    /// the jobs are redelivered elsewhere.
    pub async fn shutdown(self, timeout: Duration) -> Result<()> {
        info!(worker_id = %self.worker_id, "🛑 Worker shutting down");
        self.control.running.store(false, Ordering::Release);
        self.control.shutdown_notify.notify_waiters();

        let abort_handles: Vec<_> = self.slots.iter().map(JoinHandle::abort_handle).collect();
        let joined = tokio::time::timeout(timeout, futures::future::join_all(self.slots)).await;

        match joined {
            Ok(results) => {
                for result in results {
                    if let Err(join_error) = result {
                        if join_error.is_panic() {
                            error!(worker_id = %self.worker_id, "❌ Worker slot panicked");
                        }
                    }
                }
                info!(worker_id = %self.worker_id, stats = ?self.stats.snapshot(), "✅ Worker stopped");
                Ok(())
            }
            Err(_) => {
                for handle in abort_handles {
                    handle.abort();
                }
                warn!(
                    worker_id = %self.worker_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "⚠️ Worker did not drain before timeout; in-flight slots aborted"
                );
                Err(BatchError::Timeout {
                    operation: "worker_shutdown".to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Stop immediately without settling anything, as a crashed process would
    pub fn abort(self) {
        warn!(worker_id = %self.worker_id, "💥 Worker aborted; held leases will expire");
        self.control.running.store(false, Ordering::Release);
        for slot in &self.slots {
            slot.abort();
        }
    }
}

impl Worker {
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Spawn `worker.concurrency` slots, each leasing one job at a time
    pub fn start(self) -> WorkerHandle {
        let worker = Arc::new(self);
        let control = Arc::new(WorkerControl {
            running: AtomicBool::new(true),
            shutdown_notify: Notify::new(),
        });

        let concurrency = worker.worker_config.concurrency.max(1);
        info!(
            worker_id = %worker.worker_id,
            concurrency = concurrency,
            queue = worker.queue.provider_name(),
            handler = worker.handler.handler_name(),
            "🚀 Worker started"
        );

        let slots = (0..concurrency)
            .map(|slot| {
                let worker = Arc::clone(&worker);
                let control = Arc::clone(&control);
                tokio::spawn(async move { worker.run_slot(slot, control).await })
            })
            .collect();

        WorkerHandle {
            worker_id: worker.worker_id.clone(),
            control,
            slots,
            stats: Arc::clone(&worker.stats),
        }
    }

    async fn run_slot(self: Arc<Self>, slot: usize, control: Arc<WorkerControl>) {
        let unavailable_backoff = BackoffPolicy::for_unavailable_queue(&self.worker_config);
        let mut consecutive_unavailable: u32 = 0;
        debug!(worker_id = %self.worker_id, slot = slot, "Worker slot entering lease loop");

        while control.is_running() {
            let dequeued = tokio::select! {
                result = self.queue.dequeue(self.queue_config.lease_duration()) => result,
                _ = control.shutdown_notify.notified() => break,
            };

            match dequeued {
                Ok(Some(leased)) => {
                    consecutive_unavailable = 0;
                    self.execute(leased).await;
                }
                Ok(None) => {
                    consecutive_unavailable = 0;
                }
                Err(err) if err.is_unavailable() => {
                    self.stats.record_queue_unavailable();
                    let delay = unavailable_backoff.delay_for_attempt(consecutive_unavailable);
                    consecutive_unavailable = consecutive_unavailable.saturating_add(1);
                    warn!(
                        worker_id = %self.worker_id,
                        slot = slot,
                        error = %err,
                        backoff_ms = delay.as_millis() as u64,
                        "⚠️ Queue unavailable; backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = control.shutdown_notify.notified() => break,
                    }
                }
                Err(err) => {
                    error!(worker_id = %self.worker_id, slot = slot, error = %err, "❌ Dequeue failed");
                    tokio::select! {
                        _ = tokio::time::sleep(self.queue_config.poll_interval()) => {}
                        _ = control.shutdown_notify.notified() => break,
                    }
                }
            }
        }

        debug!(worker_id = %self.worker_id, slot = slot, "Worker slot exited");
    }

    #[instrument(skip(self, leased), fields(worker_id = %self.worker_id, job_id = %leased.job.job_id, batch_id = %leased.job.batch_id))]
    async fn execute(&self, leased: LeasedJob) {
        self.stats.record_leased();
        let LeasedJob { job, lease } = leased;
        let token = lease.token;
        let redelivered = lease.delivery_count > 1;
        let mut machine = JobStateMachine::new(job.job_id);

        if redelivered {
            debug!(delivery_count = lease.delivery_count, attempt = job.attempt, "🔁 Redelivered job leased");
        }

        match self.registry.is_cancelled(job.batch_id).await {
            Ok(true) => {
                self.advance(&mut machine, JobEvent::Decline);
                self.settle_skipped(&job, &token).await;
                return;
            }
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, "⚠️ Could not check batch cancellation; processing job");
            }
        }

        self.advance(&mut machine, JobEvent::Start);
        match self.run_handler(&job, &token).await {
            HandlerOutcome::Completed(Ok(())) => {
                self.advance(&mut machine, JobEvent::Succeed);
                self.settle_success(&job, &token, redelivered).await;
            }
            HandlerOutcome::Completed(Err(processing_error)) => {
                self.settle_failure(&mut machine, &job, &token, processing_error)
                    .await;
            }
            HandlerOutcome::LeaseLost => {
                self.advance(&mut machine, JobEvent::LoseLease);
                self.stats.record_stale_lease();
                warn!(attempt = job.attempt, "⚠️ Lease lost while processing; job abandoned to redelivery");
            }
        }
    }

    fn advance(&self, machine: &mut JobStateMachine, event: JobEvent) -> Option<JobState> {
        match machine.transition(event) {
            Ok(state) => Some(state),
            Err(err) => {
                error!(error = %err, "❌ Job state machine rejected transition");
                None
            }
        }
    }

    /// Run the handler, extending the lease on a heartbeat and enforcing
    /// `max_job_duration`
    async fn run_handler(&self, job: &Job, token: &LeaseToken) -> HandlerOutcome {
        let max_duration = self.worker_config.max_job_duration();
        let processing = tokio::time::timeout(max_duration, self.handler.process(job));
        tokio::pin!(processing);

        let timed_out = || {
            ProcessingError::transient(format!(
                "job exceeded max duration of {}ms",
                max_duration.as_millis()
            ))
        };

        if !self.queue_config.lease_extension_enabled {
            return match processing.await {
                Ok(result) => HandlerOutcome::Completed(result),
                Err(_) => HandlerOutcome::Completed(Err(timed_out())),
            };
        }

        let period = self.queue_config.heartbeat_interval().max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = &mut processing => {
                    return match result {
                        Ok(result) => HandlerOutcome::Completed(result),
                        Err(_) => HandlerOutcome::Completed(Err(timed_out())),
                    };
                }
                _ = heartbeat.tick() => {
                    let started = Instant::now();
                    match self
                        .queue
                        .extend_lease(job.job_id, token, self.queue_config.lease_duration())
                        .await
                    {
                        Ok(lease) => {
                            self.record_latency("extend_lease", started.elapsed());
                            debug!(lease_expiry = %lease.lease_expiry, "💓 Lease extended");
                        }
                        Err(err) if err.is_lease_expired() => return HandlerOutcome::LeaseLost,
                        Err(err) => {
                            warn!(error = %err, "⚠️ Lease heartbeat failed; retrying on next tick");
                        }
                    }
                }
            }
        }
    }

    async fn settle_skipped(&self, job: &Job, token: &LeaseToken) {
        match self.queue.ack(job.job_id, token).await {
            Ok(()) => {
                self.stats.record_skipped();
                if job.is_retrying() {
                    if let Err(err) = self.progress.decrement(job.batch_id, ProgressKind::Failed).await {
                        error!(error = %err, "❌ Failed to release retry count for skipped job");
                    }
                }
                info!(sequence = job.sequence, "⏭️ Skipped job of cancelled batch");
            }
            Err(err) => self.log_settle_error("ack_skipped", job, &err),
        }
    }

    async fn settle_success(&self, job: &Job, token: &LeaseToken, redelivered: bool) {
        let started = Instant::now();
        match self.queue.ack(job.job_id, token).await {
            Ok(()) => {
                self.record_latency("ack", started.elapsed());
                self.stats.record_succeeded();
                // A previous delivery may have dead-lettered this generation before losing its lease
                if redelivered {
                    match self
                        .dead_letters
                        .retract(job.job_id, job.replay_generation, None)
                        .await
                    {
                        Ok(true) => warn!(
                            replay_generation = job.replay_generation,
                            "↩️ Withdrew dead-letter entry left by an expired delivery"
                        ),
                        Ok(false) => {}
                        Err(err) => {
                            error!(error = %err, "❌ Failed to withdraw stale dead-letter entry")
                        }
                    }
                }
                self.count_outcome(job, ProgressKind::Succeeded).await;
                log_job_operation(
                    "complete",
                    Some(&job.batch_id.to_string()),
                    Some(&job.job_id.to_string()),
                    Some(job.attempt),
                    "succeeded",
                    None,
                );
            }
            Err(err) => self.log_settle_error("ack", job, &err),
        }
    }

    async fn settle_failure(
        &self,
        machine: &mut JobStateMachine,
        job: &Job,
        token: &LeaseToken,
        processing_error: ProcessingError,
    ) {
        match self.retry.decide(job, &processing_error) {
            RetryDecision::Retry {
                delay,
                next_attempt,
            } => {
                self.advance(
                    machine,
                    JobEvent::FailRetryable(processing_error.message().to_string()),
                );

                // Count before the nack: once nacked the job may be redelivered
                // and settled by another slot immediately
                let counted = !job.is_retrying()
                    && match self.progress.increment(job.batch_id, ProgressKind::Failed).await {
                        Ok(_) => true,
                        Err(err) => {
                            error!(error = %err, "❌ Failed to count job entering retry");
                            false
                        }
                    };

                let started = Instant::now();
                match self.queue.nack(job.job_id, token, delay).await {
                    Ok(()) => {
                        self.record_latency("nack", started.elapsed());
                        self.stats.record_retried();
                        self.record_error(job, &processing_error, false).await;
                        log_job_operation(
                            "retry",
                            Some(&job.batch_id.to_string()),
                            Some(&job.job_id.to_string()),
                            Some(next_attempt),
                            "failed_retryable",
                            Some(&format!(
                                "{}; retry in {}ms",
                                processing_error.message(),
                                delay.as_millis()
                            )),
                        );
                    }
                    Err(err) => {
                        if counted {
                            if let Err(undo) =
                                self.progress.decrement(job.batch_id, ProgressKind::Failed).await
                            {
                                error!(error = %undo, "❌ Failed to roll back retry count");
                            }
                        }
                        self.log_settle_error("nack", job, &err);
                    }
                }
            }
            RetryDecision::DeadLetter { reason } => {
                self.advance(
                    machine,
                    JobEvent::FailPermanent(processing_error.message().to_string()),
                );

                let permanent = processing_error.is_permanent();
                let entry = DeadLetterEntry::new(
                    job,
                    format!("{reason}: {}", processing_error.message()),
                    permanent,
                )
                .with_lease_token(token.as_str());
                // Record before acking so an acked job always has its entry
                match self.dead_letters.append(entry).await {
                    Ok(true) => {}
                    Ok(false) => debug!("Dead-letter entry already present for this generation"),
                    Err(err) => {
                        error!(error = %err, "❌ Failed to append dead-letter entry; lease will expire");
                        return;
                    }
                }

                let started = Instant::now();
                match self.queue.ack(job.job_id, token).await {
                    Ok(()) => {
                        self.record_latency("ack", started.elapsed());
                        self.stats.record_dead_lettered();
                        self.count_outcome(job, ProgressKind::DeadLettered).await;
                        self.record_error(job, &processing_error, true).await;
                        log_job_operation(
                            "dead_letter",
                            Some(&job.batch_id.to_string()),
                            Some(&job.job_id.to_string()),
                            Some(job.attempt),
                            "failed_permanent",
                            Some(&format!("{reason}: {}", processing_error.message())),
                        );
                    }
                    Err(err) => {
                        // The next delivery owns the outcome now
                        if err.is_lease_expired() {
                            if let Err(retract_err) = self
                                .dead_letters
                                .retract(job.job_id, job.replay_generation, Some(token.as_str()))
                                .await
                            {
                                error!(
                                    error = %retract_err,
                                    "❌ Failed to withdraw dead-letter entry after lease loss"
                                );
                            }
                        }
                        self.log_settle_error("ack_dead_letter", job, &err);
                    }
                }
            }
        }
    }

    /// Count a job's final outcome, moving it out of `failed` if it had been
    /// in retry
    async fn count_outcome(&self, job: &Job, kind: ProgressKind) {
        let result = if job.is_retrying() {
            self.progress
                .transfer(job.batch_id, ProgressKind::Failed, kind)
                .await
        } else {
            self.progress.increment(job.batch_id, kind).await.map(|_| ())
        };

        if let Err(err) = result {
            error!(error = %err, outcome = %kind, "❌ Failed to record job outcome");
        }
    }

    async fn record_error(&self, job: &Job, processing_error: &ProcessingError, dead_lettered: bool) {
        let sample = ErrorSample::new(
            job.job_id,
            job.attempt,
            processing_error.message(),
            dead_lettered,
        );
        if let Err(err) = self.progress.record_error(job.batch_id, sample).await {
            warn!(error = %err, "⚠️ Failed to record error sample");
        }
    }

    fn record_latency(&self, operation: &str, latency: Duration) {
        if let Some(pressure) = &self.pressure {
            pressure.record_latency(operation, latency);
        }
    }

    fn log_settle_error(&self, operation: &str, job: &Job, err: &BatchError) {
        if err.is_lease_expired() {
            self.stats.record_stale_lease();
            warn!(
                operation = %operation,
                attempt = job.attempt,
                "⚠️ Lease expired before settlement; result discarded, job will be redelivered"
            );
        } else {
            error!(operation = %operation, error = %err, "❌ Failed to settle job; lease will expire");
        }
    }
}
