use super::{BatchRegistry, RegisteredBatch};
use crate::error::{BatchError, Result};
use crate::models::{BatchId, BatchManifest};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::info;

/// Process-local registry.
///
/// ```rust
/// use tasker_batch::partition;
/// use tasker_batch::registry::{BatchRegistry, InMemoryBatchRegistry};
///
/// # tokio_test::block_on(async {
/// let registry = InMemoryBatchRegistry::new();
/// let (manifest, _jobs) = partition(1_000, 100).unwrap();
/// registry.register(&manifest).await.unwrap();
///
/// assert!(registry.cancel(manifest.batch_id).await.unwrap());
/// assert!(!registry.cancel(manifest.batch_id).await.unwrap());
/// assert!(registry.is_cancelled(manifest.batch_id).await.unwrap());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBatchRegistry {
    batches: DashMap<BatchId, RegisteredBatch>,
}

impl InMemoryBatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchRegistry for InMemoryBatchRegistry {
    async fn register(&self, manifest: &BatchManifest) -> Result<()> {
        self.batches
            .entry(manifest.batch_id)
            .or_insert_with(|| RegisteredBatch {
                manifest: manifest.clone(),
                cancelled_at: None,
            });
        Ok(())
    }

    async fn get(&self, batch_id: BatchId) -> Result<RegisteredBatch> {
        self.batches
            .get(&batch_id)
            .map(|batch| batch.clone())
            .ok_or(BatchError::BatchNotFound { batch_id })
    }

    async fn cancel(&self, batch_id: BatchId) -> Result<bool> {
        let mut batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or(BatchError::BatchNotFound { batch_id })?;
        if batch.is_cancelled() {
            return Ok(false);
        }
        batch.cancelled_at = Some(Utc::now());
        info!(batch_id = %batch_id, "🛑 Batch cancelled");
        Ok(true)
    }
}
