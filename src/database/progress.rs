use super::{to_i32, to_i64, to_u32, to_u64};
use crate::constants::defaults;
use crate::error::{BatchError, Result};
use crate::models::{
    BatchId, BatchManifest, ErrorSample, JobId, ProgressKind, ProgressRecord,
};
use crate::progress::ProgressTracker;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};

#[derive(Debug, FromRow)]
struct ProgressRow {
    job_count: i64,
    succeeded_count: i64,
    failed_count: i64,
    dead_lettered_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct CountersRow {
    succeeded_count: i64,
    failed_count: i64,
    dead_lettered_count: i64,
}

#[derive(Debug, FromRow)]
struct SampleRow {
    job_id: uuid::Uuid,
    attempt: i32,
    message: String,
    permanent: bool,
    recorded_at: DateTime<Utc>,
}

/// Signed change to each counter, applied in one statement
#[derive(Debug, Clone, Copy, Default)]
struct Delta {
    succeeded: i64,
    failed: i64,
    dead_lettered: i64,
}

impl Delta {
    fn add(mut self, kind: ProgressKind, amount: i64) -> Self {
        match kind {
            ProgressKind::Succeeded => self.succeeded += amount,
            ProgressKind::Failed => self.failed += amount,
            ProgressKind::DeadLettered => self.dead_lettered += amount,
        }
        self
    }
}

fn counter(row: &CountersRow, kind: ProgressKind) -> u64 {
    to_u64(match kind {
        ProgressKind::Succeeded => row.succeeded_count,
        ProgressKind::Failed => row.failed_count,
        ProgressKind::DeadLettered => row.dead_lettered_count,
    })
}

/// Counters in `tasker_batch_progress`, samples in `tasker_batch_error_samples`
#[derive(Debug, Clone)]
pub struct PgProgressTracker {
    pool: PgPool,
    sample_capacity: usize,
}

impl PgProgressTracker {
    pub fn new(pool: PgPool, sample_capacity: usize) -> Self {
        Self {
            pool,
            sample_capacity,
        }
    }

    pub fn with_default_capacity(pool: PgPool) -> Self {
        Self::new(pool, defaults::ERROR_SAMPLE_CAPACITY)
    }

    /// Apply `delta` atomically. Returns `None` when the batch is missing or
    /// the change would break a counter bound.
    async fn apply(&self, batch_id: BatchId, delta: Delta) -> Result<Option<CountersRow>> {
        let row = sqlx::query_as::<_, CountersRow>(
            r#"
            UPDATE tasker_batch_progress
            SET succeeded_count = succeeded_count + $2,
                failed_count = failed_count + $3,
                dead_lettered_count = dead_lettered_count + $4,
                updated_at = NOW(),
                archived_at = CASE
                    WHEN succeeded_count + $2 + dead_lettered_count + $4 = job_count THEN archived_at
                    ELSE NULL
                END
            WHERE batch_id = $1
              AND succeeded_count + $2 >= 0
              AND failed_count + $3 >= 0
              AND dead_lettered_count + $4 >= 0
              AND succeeded_count + $2 + failed_count + $3 + dead_lettered_count + $4 <= job_count
            RETURNING succeeded_count, failed_count, dead_lettered_count
            "#,
        )
        .bind(batch_id.as_uuid())
        .bind(delta.succeeded)
        .bind(delta.failed)
        .bind(delta.dead_lettered)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn exists(&self, batch_id: BatchId) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM tasker_batch_progress WHERE batch_id = $1)",
        )
        .bind(batch_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn rejected(&self, batch_id: BatchId, message: String) -> BatchError {
        match self.exists(batch_id).await {
            Ok(true) => BatchError::state_transition(message),
            Ok(false) => BatchError::BatchNotFound { batch_id },
            Err(err) => err,
        }
    }
}

#[async_trait]
impl ProgressTracker for PgProgressTracker {
    async fn create(&self, manifest: &BatchManifest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasker_batch_progress (batch_id, job_count)
            VALUES ($1, $2)
            ON CONFLICT (batch_id) DO NOTHING
            "#,
        )
        .bind(manifest.batch_id.as_uuid())
        .bind(to_i64(manifest.job_count))
        .execute(&self.pool)
        .await?;
        debug!(batch_id = %manifest.batch_id, job_count = manifest.job_count, "📊 Progress record created");
        Ok(())
    }

    async fn increment(&self, batch_id: BatchId, kind: ProgressKind) -> Result<u64> {
        match self.apply(batch_id, Delta::default().add(kind, 1)).await? {
            Some(row) => Ok(counter(&row, kind)),
            None => Err(self
                .rejected(
                    batch_id,
                    format!("increment of {kind} would exceed job count for batch {batch_id}"),
                )
                .await),
        }
    }

    async fn transfer(&self, batch_id: BatchId, from: ProgressKind, to: ProgressKind) -> Result<()> {
        let delta = Delta::default().add(from, -1).add(to, 1);
        match self.apply(batch_id, delta).await? {
            Some(_) => Ok(()),
            None => Err(self
                .rejected(
                    batch_id,
                    format!("cannot move {from} to {to} for batch {batch_id}: {from} is zero"),
                )
                .await),
        }
    }

    async fn decrement(&self, batch_id: BatchId, kind: ProgressKind) -> Result<u64> {
        match self.apply(batch_id, Delta::default().add(kind, -1)).await? {
            Some(row) => Ok(counter(&row, kind)),
            None => Err(self
                .rejected(
                    batch_id,
                    format!("cannot decrement {kind} for batch {batch_id}: already zero"),
                )
                .await),
        }
    }

    async fn record_error(&self, batch_id: BatchId, sample: ErrorSample) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO tasker_batch_error_samples
                (batch_id, job_id, attempt, message, permanent, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(batch_id.as_uuid())
        .bind(sample.job_id.as_uuid())
        .bind(to_i32(sample.attempt))
        .bind(&sample.message)
        .bind(sample.permanent)
        .bind(sample.recorded_at)
        .execute(&mut *tx)
        .await?;

        // Keep only the newest `sample_capacity` samples
        sqlx::query(
            r#"
            DELETE FROM tasker_batch_error_samples
            WHERE batch_id = $1
              AND id NOT IN (
                  SELECT id FROM tasker_batch_error_samples
                  WHERE batch_id = $1
                  ORDER BY id DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(batch_id.as_uuid())
        .bind(to_i64(self.sample_capacity as u64))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn snapshot(&self, batch_id: BatchId) -> Result<ProgressRecord> {
        let row = sqlx::query_as::<_, ProgressRow>(
            r#"
            SELECT job_count, succeeded_count, failed_count, dead_lettered_count,
                   created_at, updated_at, archived_at
            FROM tasker_batch_progress
            WHERE batch_id = $1
            "#,
        )
        .bind(batch_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BatchError::BatchNotFound { batch_id })?;

        let samples = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT job_id, attempt, message, permanent, recorded_at
            FROM (
                SELECT id, job_id, attempt, message, permanent, recorded_at
                FROM tasker_batch_error_samples
                WHERE batch_id = $1
                ORDER BY id DESC
                LIMIT $2
            ) newest
            ORDER BY id ASC
            "#,
        )
        .bind(batch_id.as_uuid())
        .bind(to_i64(self.sample_capacity as u64))
        .fetch_all(&self.pool)
        .await?;

        Ok(ProgressRecord {
            batch_id,
            job_count: to_u64(row.job_count),
            succeeded_count: to_u64(row.succeeded_count),
            failed_count: to_u64(row.failed_count),
            dead_lettered_count: to_u64(row.dead_lettered_count),
            error_samples: samples
                .into_iter()
                .map(|sample| ErrorSample {
                    job_id: JobId::from_uuid(sample.job_id),
                    attempt: to_u32(sample.attempt),
                    message: sample.message,
                    permanent: sample.permanent,
                    recorded_at: sample.recorded_at,
                })
                .collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            archived_at: row.archived_at,
        })
    }

    async fn archive(&self, batch_id: BatchId) -> Result<()> {
        let archived = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            UPDATE tasker_batch_progress
            SET archived_at = COALESCE(archived_at, NOW())
            WHERE batch_id = $1
              AND succeeded_count + dead_lettered_count = job_count
            RETURNING archived_at
            "#,
        )
        .bind(batch_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match archived {
            Some(archived_at) => {
                info!(batch_id = %batch_id, archived_at = %archived_at, "🗄️ Progress record archived");
                Ok(())
            }
            None => Err(self
                .rejected(batch_id, format!("batch {batch_id} is not terminal"))
                .await),
        }
    }
}
