use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tasker_batch::models::{Job, JobId};
use tasker_batch::worker::ChunkHandler;
use tasker_batch::ProcessingError;

/// Records every execution and applies each job's records to a side channel
/// keyed by `job_id`, the way an idempotent business handler would.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    executions: DashMap<JobId, u32>,
    applied: DashSet<JobId>,
    records_applied: AtomicU64,
    delay: Option<Duration>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn executions(&self, job_id: JobId) -> u32 {
        self.executions.get(&job_id).map(|count| *count).unwrap_or(0)
    }

    pub fn total_executions(&self) -> u32 {
        self.executions.iter().map(|entry| *entry.value()).sum()
    }

    pub fn distinct_jobs(&self) -> usize {
        self.applied.len()
    }

    /// Records applied exactly once per job, regardless of redelivery
    pub fn records_applied(&self) -> u64 {
        self.records_applied.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkHandler for RecordingHandler {
    async fn process(&self, job: &Job) -> Result<(), ProcessingError> {
        *self.executions.entry(job.job_id).or_insert(0) += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.applied.insert(job.job_id) {
            self.records_applied
                .fetch_add(job.chunk.len(), Ordering::SeqCst);
        }
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "recording"
    }
}

/// Fails selected chunk sequences with the configured error, succeeds otherwise
#[derive(Debug)]
pub struct FailingHandler {
    failing_sequences: Vec<u64>,
    error: ProcessingError,
    /// Stop failing after this many failures per job, if set
    recover_after: Option<u32>,
    attempts: DashMap<JobId, u32>,
    succeeded: DashSet<JobId>,
}

impl FailingHandler {
    pub fn always(failing_sequences: Vec<u64>, error: ProcessingError) -> Self {
        Self {
            failing_sequences,
            error,
            recover_after: None,
            attempts: DashMap::new(),
            succeeded: DashSet::new(),
        }
    }

    pub fn recovering(failing_sequences: Vec<u64>, failures: u32) -> Self {
        Self {
            recover_after: Some(failures),
            ..Self::always(failing_sequences, ProcessingError::transient("flaky downstream"))
        }
    }

    pub fn attempts(&self, job_id: JobId) -> u32 {
        self.attempts.get(&job_id).map(|count| *count).unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.iter().map(|entry| *entry.value()).sum()
    }

    pub fn succeeded_jobs(&self) -> usize {
        self.succeeded.len()
    }
}

#[async_trait]
impl ChunkHandler for FailingHandler {
    async fn process(&self, job: &Job) -> Result<(), ProcessingError> {
        let attempt = {
            let mut count = self.attempts.entry(job.job_id).or_insert(0);
            *count += 1;
            *count
        };

        let should_fail = self.failing_sequences.contains(&job.sequence)
            && self.recover_after.map_or(true, |limit| attempt <= limit);
        if should_fail {
            return Err(self.error.clone());
        }
        self.succeeded.insert(job.job_id);
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "failing"
    }
}

/// Blocks on the first execution of each job for `stall`, then succeeds.
/// Used to let a lease expire under a slow or crashed worker.
#[derive(Debug)]
pub struct StallingHandler {
    stall: Duration,
    stalled: DashSet<JobId>,
    pub executions: AtomicU32,
    completed: DashSet<JobId>,
}

impl StallingHandler {
    pub fn new(stall: Duration) -> Arc<Self> {
        Arc::new(Self {
            stall,
            stalled: DashSet::new(),
            executions: AtomicU32::new(0),
            completed: DashSet::new(),
        })
    }

    pub fn completed_jobs(&self) -> usize {
        self.completed.len()
    }
}

#[async_trait]
impl ChunkHandler for StallingHandler {
    async fn process(&self, job: &Job) -> Result<(), ProcessingError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if self.stalled.insert(job.job_id) {
            tokio::time::sleep(self.stall).await;
        }
        self.completed.insert(job.job_id);
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "stalling"
    }
}
