//! Relational store over a shared pool.

use crate::error::{Result, StorageError};
use crate::pool::DatabasePool;
use crate::schema::Migrator;
use chrono::{DateTime, Utc};
use gateway_config::DatabaseSettings;
use tracing::info;

/// Provider, override and usage persistence over SQLite or PostgreSQL
#[derive(Debug, Clone)]
pub struct SqlStore {
    pub(crate) pool: DatabasePool,
}

impl SqlStore {
    /// Store over an existing pool
    #[must_use]
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Connect and, when configured, bring the schema up to date
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let pool = DatabasePool::connect(settings).await?;
        if settings.run_migrations {
            let applied = Migrator::new(pool.clone()).run_pending().await?;
            if !applied.is_empty() {
                info!(versions = ?applied, "Database schema migrated");
            }
        }
        Ok(Self::new(pool))
    }

    /// Underlying pool
    #[must_use]
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::Corrupt(format!("timestamp out of range: {ms}")))
}

pub(crate) fn to_flag(value: bool) -> i64 {
    i64::from(value)
}

pub(crate) fn from_flag(value: i64) -> bool {
    value != 0
}

pub(crate) fn to_count(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| StorageError::Corrupt(format!("negative {column}: {value}")))
}
