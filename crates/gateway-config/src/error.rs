//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File contents could not be parsed
    #[error("failed to parse {format} config: {message}")]
    Parse {
        /// Format that was attempted
        format: &'static str,
        /// Parser message
        message: String,
    },

    /// Environment override had an unusable value
    #[error("invalid value for {var}: {message}")]
    Env {
        /// Variable name
        var: String,
        /// What was wrong
        message: String,
    },

    /// Structural or cross-field validation failed
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Invalid(errors.to_string())
    }
}
