//! # Schema Migrations
//!
//! Migrations are compiled into the crate and applied in version order. A
//! tracking table records applied versions, and a PostgreSQL advisory lock
//! keeps concurrent processes from applying the same migration twice:
//!
//! ```sql
//! SELECT pg_advisory_lock(7316822245517018432)
//! ```

use crate::error::Result;
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use tracing::info;

/// Advisory lock key for schema changes
const LOCK_KEY: i64 = 7_316_822_245_517_018_432;

/// A single embedded migration
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Version timestamp (YYYYMMDDHHMMSS format)
    pub version: &'static str,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: "20260101000000",
    name: "create batch tables",
    sql: include_str!("../../migrations/20260101000000_create_batch_tables.sql"),
}];

pub struct DatabaseMigrations;

impl DatabaseMigrations {
    pub fn all() -> &'static [Migration] {
        MIGRATIONS
    }

    /// Apply every migration not yet recorded. Safe to call from several
    /// processes at once.
    pub async fn run_all(pool: &PgPool) -> Result<()> {
        let mut conn = pool.acquire().await?;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        let result = Self::run_outstanding(&mut conn).await;

        // Always release the lock
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        result
    }

    async fn run_outstanding(conn: &mut sqlx::PgConnection) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS tasker_batch_schema_migrations (
                version VARCHAR(14) PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&mut *conn)
        .await?;

        let applied: HashSet<String> =
            sqlx::query("SELECT version FROM tasker_batch_schema_migrations")
                .fetch_all(&mut *conn)
                .await?
                .into_iter()
                .map(|row| row.get::<String, _>("version"))
                .collect();

        for migration in MIGRATIONS {
            if applied.contains(migration.version) {
                continue;
            }
            info!(version = migration.version, name = migration.name, "🗄️ Applying migration");
            sqlx::raw_sql(migration.sql).execute(&mut *conn).await?;
            sqlx::query("INSERT INTO tasker_batch_schema_migrations (version) VALUES ($1)")
                .bind(migration.version)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }
}
