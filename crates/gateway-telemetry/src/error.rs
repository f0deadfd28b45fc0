//! Telemetry errors.

use thiserror::Error;

/// Errors raised while setting up logging or metrics
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Global subscriber could not be installed
    #[error("Failed to initialize logging: {0}")]
    Init(String),

    /// Metric could not be created or encoded
    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl From<prometheus::Error> for TelemetryError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}
