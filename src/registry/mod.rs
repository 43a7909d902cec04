//! # Batch Registry
//!
//! Stores immutable manifests and the one mutable bit a batch carries: its
//! `cancelled` flag. Workers consult the flag before starting a job.

pub mod in_memory;

pub use in_memory::InMemoryBatchRegistry;

use crate::error::Result;
use crate::models::{BatchId, BatchManifest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredBatch {
    pub manifest: BatchManifest,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl RegisteredBatch {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }
}

#[async_trait]
pub trait BatchRegistry: Send + Sync + 'static {
    /// Store a manifest. Registering the same batch twice is a no-op.
    async fn register(&self, manifest: &BatchManifest) -> Result<()>;

    async fn get(&self, batch_id: BatchId) -> Result<RegisteredBatch>;

    /// Set the cancelled flag; returns `false` if it was already set
    async fn cancel(&self, batch_id: BatchId) -> Result<bool>;

    async fn is_cancelled(&self, batch_id: BatchId) -> Result<bool> {
        Ok(self.get(batch_id).await?.is_cancelled())
    }
}
