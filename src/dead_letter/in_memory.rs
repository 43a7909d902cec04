use super::DeadLetterStore;
use crate::error::{BatchError, Result};
use crate::models::{BatchId, DeadLetterEntry, JobId};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};

/// Entries per job, oldest replay generation first
#[derive(Debug, Default)]
pub struct InMemoryDeadLetterStore {
    entries: DashMap<JobId, Vec<DeadLetterEntry>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn append(&self, entry: DeadLetterEntry) -> Result<bool> {
        let (job_id, batch_id) = (entry.job_id, entry.batch_id);
        let (attempts_made, permanent) = (entry.attempts_made, entry.permanent);
        let generation = entry.replay_generation();

        {
            let mut history = self.entries.entry(job_id).or_default();
            if let Some(latest) = history.last_mut() {
                if latest.replay_generation() >= generation {
                    if latest.replay_generation() == generation && !latest.is_replayed() {
                        latest.lease_token = entry.lease_token;
                    }
                    warn!(job_id = %job_id, replay_generation = generation, "⚠️ Duplicate dead-letter append ignored");
                    return Ok(false);
                }
            }
            history.push(entry);
        }

        info!(
            job_id = %job_id,
            batch_id = %batch_id,
            attempts_made = attempts_made,
            permanent = permanent,
            replay_generation = generation,
            "☠️ Job dead-lettered"
        );
        Ok(true)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<DeadLetterEntry>> {
        Ok(self
            .entries
            .get(&job_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn history(&self, job_id: JobId) -> Result<Vec<DeadLetterEntry>> {
        Ok(self
            .entries
            .get(&job_id)
            .map(|history| history.clone())
            .unwrap_or_default())
    }

    async fn list(&self, batch_id: BatchId) -> Result<Vec<DeadLetterEntry>> {
        let mut entries: Vec<DeadLetterEntry> = self
            .entries
            .iter()
            .flat_map(|history| {
                history
                    .iter()
                    .filter(|entry| entry.batch_id == batch_id && !entry.is_replayed())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        entries.sort_by_key(|entry| entry.job.sequence);
        Ok(entries)
    }

    async fn mark_replayed(&self, job_id: JobId) -> Result<DeadLetterEntry> {
        let mut history = self
            .entries
            .get_mut(&job_id)
            .ok_or(BatchError::DeadLetterNotFound { job_id })?;
        let entry = history
            .last_mut()
            .ok_or(BatchError::DeadLetterNotFound { job_id })?;
        if entry.is_replayed() {
            return Err(BatchError::AlreadyReplayed { job_id });
        }
        let original = entry.clone();
        entry.replayed_at = Some(Utc::now());
        Ok(original)
    }

    async fn restore(&self, job_id: JobId) -> Result<()> {
        let mut history = self
            .entries
            .get_mut(&job_id)
            .ok_or(BatchError::DeadLetterNotFound { job_id })?;
        let entry = history
            .last_mut()
            .ok_or(BatchError::DeadLetterNotFound { job_id })?;
        entry.replayed_at = None;
        Ok(())
    }

    async fn retract(
        &self,
        job_id: JobId,
        replay_generation: u32,
        lease_token: Option<&str>,
    ) -> Result<bool> {
        let retracted = match self.entries.get_mut(&job_id) {
            Some(mut history) => {
                let position = history.iter().position(|entry| {
                    entry.replay_generation() == replay_generation
                        && !entry.is_replayed()
                        && lease_token.map_or(true, |token| entry.lease_token.as_deref() == Some(token))
                });
                position.map(|index| history.remove(index)).is_some()
            }
            None => false,
        };

        if retracted {
            self.entries.remove_if(&job_id, |_, history| history.is_empty());
            info!(job_id = %job_id, replay_generation = replay_generation, "↩️ Dead-letter entry retracted");
        }
        Ok(retracted)
    }
}
