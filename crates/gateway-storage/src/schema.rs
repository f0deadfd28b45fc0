//! Schema migrations.
//!
//! Every statement is portable between SQLite and PostgreSQL: integers and
//! booleans are `BIGINT`, floats are `DOUBLE PRECISION`, ids and JSON are
//! `TEXT`, and timestamps are epoch milliseconds.

use crate::error::{Result, StorageError};
use crate::pool::DatabasePool;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::Row;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

/// One versioned schema change
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version, applied in ascending order
    pub version: i64,
    /// Short description
    pub name: &'static str,
    /// Statements, executed one at a time
    pub statements: &'static [&'static str],
}

impl Migration {
    /// SHA-256 over the statements
    #[must_use]
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for statement in self.statements {
            hasher.update(statement.trim().as_bytes());
            hasher.update(b";");
        }
        hex::encode(hasher.finalize())
    }
}

/// Gateway schema
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_providers",
        statements: &[r"
            CREATE TABLE IF NOT EXISTS providers (
                name TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                api_key_encrypted TEXT NOT NULL,
                base_url TEXT,
                models TEXT NOT NULL,
                is_enabled BIGINT NOT NULL,
                priority BIGINT NOT NULL,
                rate_limit_rpm BIGINT NOT NULL,
                rate_limit_tpm BIGINT NOT NULL,
                settings TEXT,
                extra_config TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            )"],
    },
    Migration {
        version: 2,
        name: "create_customer_overrides",
        statements: &[r"
            CREATE TABLE IF NOT EXISTS customer_overrides (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                service TEXT NOT NULL DEFAULT '',
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL,
                UNIQUE (user_id, service)
            )"],
    },
    Migration {
        version: 3,
        name: "create_usage_logs",
        statements: &[
            r"
            CREATE TABLE IF NOT EXISTS usage_logs (
                id TEXT PRIMARY KEY,
                request_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                service TEXT NOT NULL,
                task_type TEXT NOT NULL,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                input_tokens BIGINT NOT NULL,
                output_tokens BIGINT NOT NULL,
                cost_usd DOUBLE PRECISION NOT NULL,
                latency_ms BIGINT NOT NULL,
                cached BIGINT NOT NULL,
                error_message TEXT,
                error_kind TEXT,
                prompt_preview TEXT NOT NULL,
                created_at BIGINT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_usage_logs_created_at ON usage_logs (created_at)",
            "CREATE INDEX IF NOT EXISTS idx_usage_logs_user ON usage_logs (user_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_usage_logs_provider ON usage_logs (provider, created_at)",
        ],
    },
];

const INIT_SQL: &str = r"
    CREATE TABLE IF NOT EXISTS schema_migrations (
        version BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        checksum TEXT NOT NULL,
        applied_at BIGINT NOT NULL,
        execution_time_ms BIGINT NOT NULL
    )";

/// A row of `schema_migrations`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Version
    pub version: i64,
    /// Name at the time it ran
    pub name: String,
    /// Checksum at the time it ran
    pub checksum: String,
}

/// Migration runner
#[derive(Debug, Clone)]
pub struct Migrator {
    pool: DatabasePool,
    migrations: &'static [Migration],
}

impl Migrator {
    /// Runner over the gateway schema
    #[must_use]
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            pool,
            migrations: MIGRATIONS,
        }
    }

    /// Known migrations
    #[must_use]
    pub fn migrations(&self) -> &[Migration] {
        self.migrations
    }

    /// Create the bookkeeping table
    pub async fn init(&self) -> Result<()> {
        sqlx::query(INIT_SQL).execute(self.pool.inner()).await?;
        Ok(())
    }

    /// Applied migrations in version order
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        self.init().await?;
        let rows = sqlx::query("SELECT version, name, checksum FROM schema_migrations ORDER BY version")
            .fetch_all(self.pool.inner())
            .await?;

        rows.iter()
            .map(|row| -> Result<AppliedMigration> {
                Ok(AppliedMigration {
                    version: row.try_get("version")?,
                    name: row.try_get("name")?,
                    checksum: row.try_get("checksum")?,
                })
            })
            .collect()
    }

    /// Migrations not yet applied.
    ///
    /// Fails when an applied migration no longer matches its definition.
    pub async fn pending(&self) -> Result<Vec<&Migration>> {
        let applied: HashMap<i64, String> = self
            .applied()
            .await?
            .into_iter()
            .map(|a| (a.version, a.checksum))
            .collect();

        let mut pending = Vec::new();
        for migration in self.migrations {
            match applied.get(&migration.version) {
                Some(recorded) => {
                    let expected = migration.checksum();
                    if *recorded != expected {
                        return Err(StorageError::ChecksumMismatch {
                            version: migration.version,
                            recorded: recorded.clone(),
                            expected,
                        });
                    }
                }
                None => pending.push(migration),
            }
        }
        Ok(pending)
    }

    /// Apply every pending migration, each in its own transaction.
    /// Returns the versions applied.
    pub async fn run_pending(&self) -> Result<Vec<i64>> {
        let pending = self.pending().await?;
        if pending.is_empty() {
            debug!("Schema is up to date");
            return Ok(Vec::new());
        }

        let mut applied = Vec::with_capacity(pending.len());
        for migration in pending {
            let start = Instant::now();
            let mut tx = self.pool.inner().begin().await?;

            for statement in migration.statements {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StorageError::Migration {
                        version: migration.version,
                        reason: e.to_string(),
                    })?;
            }

            let elapsed = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);
            sqlx::query(
                "INSERT INTO schema_migrations (version, name, checksum, applied_at, execution_time_ms)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(migration.version)
            .bind(migration.name)
            .bind(migration.checksum())
            .bind(Utc::now().timestamp_millis())
            .bind(elapsed)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            info!(
                version = migration.version,
                name = migration.name,
                duration_ms = elapsed,
                "Migration applied"
            );
            applied.push(migration.version);
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_ascend() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[test]
    fn test_checksum_is_stable_and_distinct() {
        let a = MIGRATIONS[0].checksum();
        assert_eq!(a, MIGRATIONS[0].checksum());
        assert_eq!(a.len(), 64);
        assert_ne!(a, MIGRATIONS[1].checksum());
    }
}
