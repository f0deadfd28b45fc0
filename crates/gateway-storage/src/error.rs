//! Storage error types.

use gateway_core::StoreError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage error type.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(String),

    /// SQL execution error.
    #[error("SQL execution error: {0}")]
    Execution(String),

    /// Pool exhausted or closed.
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// Migration failed.
    #[error("Migration {version} failed: {reason}")]
    Migration {
        /// Migration version.
        version: i64,
        /// Failure reason.
        reason: String,
    },

    /// An applied migration no longer matches its definition.
    #[error("Checksum mismatch for migration {version}: recorded {recorded}, expected {expected}")]
    ChecksumMismatch {
        /// Migration version.
        version: i64,
        /// Checksum stored when applied.
        recorded: String,
        /// Checksum of the current definition.
        expected: String,
    },

    /// Row could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Unsupported database URL.
    #[error("Database type not supported: {0}")]
    UnsupportedDatabase(String),
}

impl StorageError {
    /// Check if the error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Pool(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => Self::Connection(e.to_string()),
            sqlx::Error::Io(e) => Self::Connection(e.to_string()),
            sqlx::Error::Tls(e) => Self::Connection(e.to_string()),
            sqlx::Error::PoolTimedOut => Self::Pool("Connection pool timed out".to_string()),
            sqlx::Error::PoolClosed => Self::Pool("Connection pool is closed".to_string()),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::Corrupt(format!("column {index}: {source}"))
            }
            sqlx::Error::Decode(e) => Self::Corrupt(e.to_string()),
            _ => Self::Execution(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Corrupt(msg) => Self::Corrupt(msg),
            other => Self::Unavailable(other.to_string()),
        }
    }
}
