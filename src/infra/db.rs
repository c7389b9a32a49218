use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::{Duration, Instant};

use crate::config::AppConfig;

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
    slow_transaction: Duration,
}

impl Db {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.db_idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.db_max_lifetime_seconds))
            .connect(&config.database_url)
            .await?;
        Ok(Self::from_pool(
            pool,
            Duration::from_millis(config.slow_transaction_ms),
        ))
    }

    pub fn from_pool(pool: PgPool, slow_transaction: Duration) -> Self {
        Self {
            pool,
            slow_transaction,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Starts timing a unit of work. Hold the guard for as long as the
    /// transaction is open.
    pub fn watch(&self, label: &'static str) -> TxWatch {
        TxWatch {
            label,
            started: Instant::now(),
            threshold: self.slow_transaction,
        }
    }
}

/// Logs a warning on drop when the watched transaction ran past its bound.
#[must_use = "the watch measures until it is dropped"]
pub struct TxWatch {
    label: &'static str,
    started: Instant,
    threshold: Duration,
}

impl Drop for TxWatch {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        if elapsed > self.threshold {
            tracing::warn!(
                transaction = self.label,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.threshold.as_millis() as u64,
                "transaction held open longer than expected"
            );
        }
    }
}
