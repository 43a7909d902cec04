use super::{to_i32, to_i64, to_u32, to_u64};
use crate::error::{BatchError, Result};
use crate::models::{BatchId, BatchManifest};
use crate::registry::{BatchRegistry, RegisteredBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::info;

#[derive(Debug, FromRow)]
struct ManifestRow {
    batch_id: uuid::Uuid,
    total_records: i64,
    chunk_size: i64,
    job_count: i64,
    max_attempts: i32,
    created_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl From<ManifestRow> for RegisteredBatch {
    fn from(row: ManifestRow) -> Self {
        Self {
            manifest: BatchManifest {
                batch_id: BatchId::from_uuid(row.batch_id),
                total_records: to_u64(row.total_records),
                chunk_size: to_u64(row.chunk_size),
                job_count: to_u64(row.job_count),
                max_attempts: to_u32(row.max_attempts),
                created_at: row.created_at,
            },
            cancelled_at: row.cancelled_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgBatchRegistry {
    pool: PgPool,
}

impl PgBatchRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BatchRegistry for PgBatchRegistry {
    async fn register(&self, manifest: &BatchManifest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasker_batch_manifests
                (batch_id, total_records, chunk_size, job_count, max_attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (batch_id) DO NOTHING
            "#,
        )
        .bind(manifest.batch_id.as_uuid())
        .bind(to_i64(manifest.total_records))
        .bind(to_i64(manifest.chunk_size))
        .bind(to_i64(manifest.job_count))
        .bind(to_i32(manifest.max_attempts))
        .bind(manifest.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, batch_id: BatchId) -> Result<RegisteredBatch> {
        sqlx::query_as::<_, ManifestRow>(
            r#"
            SELECT batch_id, total_records, chunk_size, job_count, max_attempts,
                   created_at, cancelled_at
            FROM tasker_batch_manifests
            WHERE batch_id = $1
            "#,
        )
        .bind(batch_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Into::into)
        .ok_or(BatchError::BatchNotFound { batch_id })
    }

    async fn cancel(&self, batch_id: BatchId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasker_batch_manifests SET cancelled_at = NOW() WHERE batch_id = $1 AND cancelled_at IS NULL",
        )
        .bind(batch_id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            info!(batch_id = %batch_id, "🛑 Batch cancelled");
            return Ok(true);
        }
        // Distinguish "already cancelled" from "unknown batch"
        self.get(batch_id).await.map(|_| false)
    }
}
