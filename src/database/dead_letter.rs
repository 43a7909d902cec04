use super::{to_i32, to_i64, to_u32};
use crate::dead_letter::DeadLetterStore;
use crate::error::{BatchError, Result};
use crate::models::{BatchId, DeadLetterEntry, Job, JobId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};

#[derive(Debug, FromRow)]
struct DeadLetterRow {
    job_id: uuid::Uuid,
    batch_id: uuid::Uuid,
    last_error: String,
    attempts_made: i32,
    permanent: bool,
    job: Json<Job>,
    dead_lettered_at: DateTime<Utc>,
    replayed_at: Option<DateTime<Utc>>,
    lease_token: Option<String>,
}

impl From<DeadLetterRow> for DeadLetterEntry {
    fn from(row: DeadLetterRow) -> Self {
        Self {
            job_id: JobId::from_uuid(row.job_id),
            batch_id: BatchId::from_uuid(row.batch_id),
            last_error: row.last_error,
            attempts_made: to_u32(row.attempts_made),
            permanent: row.permanent,
            job: row.job.0,
            dead_lettered_at: row.dead_lettered_at,
            replayed_at: row.replayed_at,
            lease_token: row.lease_token,
        }
    }
}

const COLUMNS: &str = "job_id, batch_id, last_error, attempts_made, permanent, job, \
                       dead_lettered_at, replayed_at, lease_token";

/// Matches the newest generation of job `$1`
const LATEST_GENERATION: &str = "replay_generation = (SELECT MAX(replay_generation) \
                                 FROM tasker_batch_dead_letters WHERE job_id = $1)";

#[derive(Debug, Clone)]
pub struct PgDeadLetterStore {
    pool: PgPool,
}

impl PgDeadLetterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, job_id: JobId) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM tasker_batch_dead_letters WHERE job_id = $1)",
        )
        .bind(job_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl DeadLetterStore for PgDeadLetterStore {
    async fn append(&self, entry: DeadLetterEntry) -> Result<bool> {
        let generation = to_i32(entry.replay_generation());
        let inserted = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            INSERT INTO tasker_batch_dead_letters
                (job_id, batch_id, sequence, replay_generation, last_error, attempts_made,
                 permanent, job, dead_lettered_at, replayed_at, lease_token)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, $10
            WHERE NOT EXISTS (
                SELECT 1 FROM tasker_batch_dead_letters
                WHERE job_id = $1 AND replay_generation >= $4
            )
            ON CONFLICT (job_id, replay_generation) DO NOTHING
            RETURNING job_id
            "#,
        )
        .bind(entry.job_id.as_uuid())
        .bind(entry.batch_id.as_uuid())
        .bind(to_i64(entry.job.sequence))
        .bind(generation)
        .bind(&entry.last_error)
        .bind(to_i32(entry.attempts_made))
        .bind(entry.permanent)
        .bind(Json(&entry.job))
        .bind(entry.dead_lettered_at)
        .bind(entry.lease_token.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_none() {
            // Same-generation duplicate: the newest writer owns the entry
            sqlx::query(
                r#"
                UPDATE tasker_batch_dead_letters
                SET lease_token = $3
                WHERE job_id = $1 AND replay_generation = $2 AND replayed_at IS NULL
                "#,
            )
            .bind(entry.job_id.as_uuid())
            .bind(generation)
            .bind(entry.lease_token.as_deref())
            .execute(&self.pool)
            .await?;
            warn!(job_id = %entry.job_id, replay_generation = generation, "⚠️ Duplicate dead-letter append ignored");
            return Ok(false);
        }

        info!(
            job_id = %entry.job_id,
            batch_id = %entry.batch_id,
            attempts_made = entry.attempts_made,
            permanent = entry.permanent,
            replay_generation = generation,
            "☠️ Job dead-lettered"
        );
        Ok(true)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<DeadLetterEntry>> {
        let row = sqlx::query_as::<_, DeadLetterRow>(&format!(
            "SELECT {COLUMNS} FROM tasker_batch_dead_letters WHERE job_id = $1 \
             ORDER BY replay_generation DESC LIMIT 1"
        ))
        .bind(job_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn history(&self, job_id: JobId) -> Result<Vec<DeadLetterEntry>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(&format!(
            "SELECT {COLUMNS} FROM tasker_batch_dead_letters WHERE job_id = $1 \
             ORDER BY replay_generation"
        ))
        .bind(job_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list(&self, batch_id: BatchId) -> Result<Vec<DeadLetterEntry>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(&format!(
            "SELECT {COLUMNS} FROM tasker_batch_dead_letters \
             WHERE batch_id = $1 AND replayed_at IS NULL ORDER BY sequence, replay_generation"
        ))
        .bind(batch_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_replayed(&self, job_id: JobId) -> Result<DeadLetterEntry> {
        let row = sqlx::query_as::<_, DeadLetterRow>(&format!(
            "UPDATE tasker_batch_dead_letters SET replayed_at = NOW() \
             WHERE job_id = $1 AND replayed_at IS NULL AND {LATEST_GENERATION} \
             RETURNING {COLUMNS}"
        ))
        .bind(job_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut original = DeadLetterEntry::from(row);
                original.replayed_at = None;
                Ok(original)
            }
            None if self.exists(job_id).await? => Err(BatchError::AlreadyReplayed { job_id }),
            None => Err(BatchError::DeadLetterNotFound { job_id }),
        }
    }

    async fn restore(&self, job_id: JobId) -> Result<()> {
        let result = sqlx::query(&format!(
            "UPDATE tasker_batch_dead_letters SET replayed_at = NULL \
             WHERE job_id = $1 AND {LATEST_GENERATION}"
        ))
        .bind(job_id.as_uuid())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(BatchError::DeadLetterNotFound { job_id });
        }
        Ok(())
    }

    async fn retract(
        &self,
        job_id: JobId,
        replay_generation: u32,
        lease_token: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM tasker_batch_dead_letters
            WHERE job_id = $1
              AND replay_generation = $2
              AND replayed_at IS NULL
              AND ($3::TEXT IS NULL OR lease_token = $3)
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(to_i32(replay_generation))
        .bind(lease_token)
        .execute(&self.pool)
        .await?;

        let retracted = result.rows_affected() > 0;
        if retracted {
            info!(job_id = %job_id, replay_generation = replay_generation, "↩️ Dead-letter entry retracted");
        }
        Ok(retracted)
    }

    async fn count(&self, batch_id: BatchId) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tasker_batch_dead_letters WHERE batch_id = $1 AND replayed_at IS NULL",
        )
        .bind(batch_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(super::to_u64(count))
    }
}
