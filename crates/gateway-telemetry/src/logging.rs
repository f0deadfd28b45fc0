//! Structured logging setup.

use crate::error::TelemetryError;
use gateway_config::{LogFormat, LoggingSettings};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Build the level filter; `RUST_LOG` wins over the configured level.
///
/// # Errors
/// Returns error if the configured directive does not parse
pub fn build_filter(level: &str) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| TelemetryError::Init(e.to_string())),
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns error if the filter is invalid or a subscriber is already set
pub fn init_logging(settings: &LoggingSettings) -> Result<(), TelemetryError> {
    let filter = build_filter(&settings.level)?;

    let layer = match settings.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    info!(
        level = %settings.level,
        format = ?settings.format,
        version = env!("CARGO_PKG_VERSION"),
        "Logging initialized"
    );

    Ok(())
}

/// Span covering one generate request
#[macro_export]
macro_rules! generate_span {
    ($request_id:expr, $user_id:expr, $service:expr) => {
        tracing::info_span!(
            "generate",
            request_id = %$request_id,
            user_id = %$user_id,
            service = %$service,
            provider = tracing::field::Empty,
            model = tracing::field::Empty,
        )
    };
}
