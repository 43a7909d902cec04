use crate::config::DatabaseConfig;
use crate::constants::env;
use crate::error::{BatchError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    /// Connect using `database.url`, falling back to `DATABASE_URL`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = match &config.url {
            Some(url) => url.clone(),
            None => std::env::var(env::DATABASE_URL).map_err(|_| {
                BatchError::configuration(format!(
                    "database.url is not set and {} is not defined",
                    env::DATABASE_URL
                ))
            })?,
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&url)
            .await?;

        info!(max_connections = config.max_connections, "🗄️ Database pool connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS health")
            .fetch_one(&self.pool)
            .await?;

        let health: i32 = row.get("health");
        Ok(health == 1)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
