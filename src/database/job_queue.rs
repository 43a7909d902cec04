use super::{to_i32, to_i64, to_u32, to_u64};
use crate::config::QueueConfig;
use crate::error::{BatchError, Result};
use crate::messaging::{EnqueueOutcome, JobQueue, Lease, LeaseToken, LeasedJob, QueueStats};
use crate::models::{Job, JobId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const PROVIDER_NAME: &str = "postgres";

#[derive(Debug, FromRow)]
struct LeasedRow {
    payload: Json<Job>,
    attempt: i32,
    leased_at: DateTime<Utc>,
    lease_expiry: DateTime<Utc>,
    delivery_count: i32,
}

#[derive(Debug, FromRow)]
struct LeaseRow {
    leased_at: DateTime<Utc>,
    lease_expiry: DateTime<Utc>,
    delivery_count: i32,
}

#[derive(Debug, FromRow)]
struct DepthRow {
    ready: i64,
    delayed: i64,
    leased: i64,
    completed: i64,
}

#[derive(Debug, Default)]
struct ClientCounters {
    total_enqueued: AtomicU64,
    total_acked: AtomicU64,
    total_nacked: AtomicU64,
    total_redelivered: AtomicU64,
    total_stale_rejections: AtomicU64,
}

/// Lease queue stored in `tasker_batch_jobs`.
///
/// `total_*` counters in [`QueueStats`] are per client; queue depths come
/// from the table.
#[derive(Debug)]
pub struct PgJobQueue {
    pool: PgPool,
    queue_name: String,
    poll_timeout: Duration,
    poll_interval: Duration,
    counters: ClientCounters,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, config: &QueueConfig) -> Self {
        Self {
            pool,
            queue_name: config.queue_name.clone(),
            poll_timeout: config.poll_timeout(),
            poll_interval: config.poll_interval(),
            counters: ClientCounters::default(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn try_lease(&self, lease_duration: Duration) -> Result<Option<LeasedJob>> {
        let token = LeaseToken::generate();
        let row = sqlx::query_as::<_, LeasedRow>(
            r#"
            WITH candidate AS (
                SELECT job_id
                FROM tasker_batch_jobs
                WHERE queue_name = $1
                  AND completed_at IS NULL
                  AND visible_at <= NOW()
                  AND (lease_expiry IS NULL OR lease_expiry <= NOW())
                ORDER BY visible_at, sequence
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE tasker_batch_jobs AS j
            SET lease_token = $2,
                leased_at = NOW(),
                lease_expiry = NOW() + make_interval(secs => $3),
                delivery_count = j.delivery_count + 1
            FROM candidate
            WHERE j.job_id = candidate.job_id
            RETURNING j.payload, j.attempt, j.leased_at, j.lease_expiry, j.delivery_count
            "#,
        )
        .bind(&self.queue_name)
        .bind(token.as_str())
        .bind(lease_duration.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let mut job = row.payload.0;
            // the column is authoritative; the payload keeps the enqueue-time value
            job.attempt = to_u32(row.attempt);
            let delivery_count = to_u32(row.delivery_count);
            if delivery_count > 1 {
                self.counters.total_redelivered.fetch_add(1, Ordering::Relaxed);
            }
            LeasedJob {
                lease: Lease {
                    job_id: job.job_id,
                    token,
                    leased_at: row.leased_at,
                    lease_expiry: row.lease_expiry,
                    delivery_count,
                },
                job,
            }
        }))
    }

    /// Distinguish a stale lease from an unknown job after a guarded update
    /// matched no row
    async fn lease_failure(&self, job_id: JobId) -> BatchError {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM tasker_batch_jobs WHERE job_id = $1)",
        )
        .bind(job_id.as_uuid())
        .fetch_one(&self.pool)
        .await;

        match exists {
            Ok(true) => {
                self.counters
                    .total_stale_rejections
                    .fetch_add(1, Ordering::Relaxed);
                BatchError::lease_expired(job_id)
            }
            Ok(false) => BatchError::JobNotFound { job_id },
            Err(err) => err.into(),
        }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: &Job) -> Result<EnqueueOutcome> {
        let inserted = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            INSERT INTO tasker_batch_jobs
                (job_id, queue_name, batch_id, sequence, replay_generation, attempt, payload, visible_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (job_id) DO UPDATE
            SET replay_generation = EXCLUDED.replay_generation,
                attempt = EXCLUDED.attempt,
                payload = EXCLUDED.payload,
                visible_at = NOW(),
                lease_token = NULL,
                leased_at = NULL,
                lease_expiry = NULL,
                delivery_count = 0,
                enqueued_at = NOW(),
                completed_at = NULL
            WHERE tasker_batch_jobs.replay_generation < EXCLUDED.replay_generation
            RETURNING job_id
            "#,
        )
        .bind(job.job_id.as_uuid())
        .bind(&self.queue_name)
        .bind(job.batch_id.as_uuid())
        .bind(to_i64(job.sequence))
        .bind(to_i32(job.replay_generation))
        .bind(to_i32(job.attempt))
        .bind(Json(job))
        .fetch_optional(&self.pool)
        .await?;

        let outcome = match inserted {
            Some(_) => {
                self.counters.total_enqueued.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::Enqueued
            }
            None => EnqueueOutcome::Duplicate,
        };
        debug!(job_id = %job.job_id, outcome = ?outcome, "📤 Enqueued job");
        Ok(outcome)
    }

    async fn dequeue(&self, lease_duration: Duration) -> Result<Option<LeasedJob>> {
        let deadline = Instant::now() + self.poll_timeout;
        loop {
            if let Some(leased) = self.try_lease(lease_duration).await? {
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
            tokio::time::sleep((deadline - now).min(self.poll_interval)).await;
        }
    }

    async fn ack(&self, job_id: JobId, token: &LeaseToken) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasker_batch_jobs
            SET completed_at = NOW(), lease_token = NULL, lease_expiry = NULL
            WHERE job_id = $1
              AND lease_token = $2
              AND lease_expiry > NOW()
              AND completed_at IS NULL
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(token.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.lease_failure(job_id).await);
        }
        self.counters.total_acked.fetch_add(1, Ordering::Relaxed);
        debug!(job_id = %job_id, "✅ Acked job");
        Ok(())
    }

    async fn nack(&self, job_id: JobId, token: &LeaseToken, delay: Duration) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasker_batch_jobs
            SET attempt = attempt + 1,
                visible_at = NOW() + make_interval(secs => $3),
                lease_token = NULL,
                leased_at = NULL,
                lease_expiry = NULL
            WHERE job_id = $1
              AND lease_token = $2
              AND lease_expiry > NOW()
              AND completed_at IS NULL
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(token.as_str())
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.lease_failure(job_id).await);
        }
        self.counters.total_nacked.fetch_add(1, Ordering::Relaxed);
        debug!(job_id = %job_id, delay_ms = delay.as_millis() as u64, "↩️ Nacked job");
        Ok(())
    }

    async fn extend_lease(
        &self,
        job_id: JobId,
        token: &LeaseToken,
        additional: Duration,
    ) -> Result<Lease> {
        let row = sqlx::query_as::<_, LeaseRow>(
            r#"
            UPDATE tasker_batch_jobs
            SET lease_expiry = NOW() + make_interval(secs => $3)
            WHERE job_id = $1
              AND lease_token = $2
              AND lease_expiry > NOW()
              AND completed_at IS NULL
            RETURNING leased_at, lease_expiry, delivery_count
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(token.as_str())
        .bind(additional.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Lease {
                job_id,
                token: token.clone(),
                leased_at: row.leased_at,
                lease_expiry: row.lease_expiry,
                delivery_count: to_u32(row.delivery_count),
            }),
            None => {
                let err = self.lease_failure(job_id).await;
                warn!(job_id = %job_id, error = %err, "⚠️ Lease extension rejected");
                Err(err)
            }
        }
    }

    async fn stats(&self) -> Result<QueueStats> {
        let depths = sqlx::query_as::<_, DepthRow>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE completed_at IS NULL AND visible_at <= NOW()
                                 AND (lease_expiry IS NULL OR lease_expiry <= NOW())) AS ready,
                COUNT(*) FILTER (WHERE completed_at IS NULL AND visible_at > NOW()
                                 AND lease_expiry IS NULL) AS delayed,
                COUNT(*) FILTER (WHERE completed_at IS NULL AND lease_expiry > NOW()) AS leased,
                COUNT(*) FILTER (WHERE completed_at IS NOT NULL) AS completed
            FROM tasker_batch_jobs
            WHERE queue_name = $1
            "#,
        )
        .bind(&self.queue_name)
        .fetch_one(&self.pool)
        .await?;

        let mut stats = QueueStats::new(PROVIDER_NAME)
            .with_depths(to_u64(depths.ready), to_u64(depths.delayed), to_u64(depths.leased))
            .with_completed(to_u64(depths.completed));
        stats.total_enqueued = self.counters.total_enqueued.load(Ordering::Relaxed);
        stats.total_acked = self.counters.total_acked.load(Ordering::Relaxed);
        stats.total_nacked = self.counters.total_nacked.load(Ordering::Relaxed);
        stats.total_redelivered = self.counters.total_redelivered.load(Ordering::Relaxed);
        stats.total_stale_rejections = self.counters.total_stale_rejections.load(Ordering::Relaxed);
        Ok(stats)
    }

    async fn health_check(&self) -> Result<bool> {
        let health = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(health == 1)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}
