//! Database connection pool management.

use crate::error::{Result, StorageError};
use gateway_config::DatabaseSettings;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::{debug, info};

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    /// PostgreSQL
    Postgres,
    /// SQLite, file or in-memory
    Sqlite,
}

impl DatabaseKind {
    /// Detect the engine from a connection URL
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if url.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else {
            None
        }
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgresql"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Shared connection pool
#[derive(Clone)]
pub struct DatabasePool {
    pool: AnyPool,
    kind: DatabaseKind,
}

impl DatabasePool {
    /// Connect using the configured settings.
    ///
    /// In-memory SQLite databases live only as long as their connection, so
    /// the pool is pinned to a single connection that never expires.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let kind = DatabaseKind::from_url(&settings.url)
            .ok_or_else(|| StorageError::UnsupportedDatabase(redact(&settings.url)))?;

        sqlx::any::install_default_drivers();

        let options = if kind == DatabaseKind::Sqlite && is_in_memory(&settings.url) {
            AnyPoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new()
                .max_connections(settings.max_connections)
                .min_connections(settings.min_connections.min(settings.max_connections))
        };

        let pool = options
            .acquire_timeout(settings.connect_timeout)
            .connect(&settings.url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!(
            database = %kind,
            max_connections = pool.options().get_max_connections(),
            "Database pool connected"
        );

        Ok(Self { pool, kind })
    }

    /// Underlying pool
    #[must_use]
    pub fn inner(&self) -> &AnyPool {
        &self.pool
    }

    /// Engine behind this pool
    #[must_use]
    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        debug!("Database ping succeeded");
        Ok(())
    }

    /// Check if the pool is closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Close every connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Current pool statistics
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        }
    }
}

impl std::fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabasePool")
            .field("kind", &self.kind)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Open connections
    pub size: u32,
    /// Idle connections
    pub idle: usize,
}

/// Strip credentials from a connection URL before it reaches a log line
#[must_use]
pub fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
