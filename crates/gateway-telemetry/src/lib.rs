//! # Gateway Telemetry
//!
//! Observability and accounting for the LLM Gateway.
//!
//! This crate provides:
//! - Structured logging setup (JSON, pretty or compact)
//! - Prometheus metrics with a text exposition endpoint
//! - Cost calculation from a tiered pricing table
//! - The usage recorder that writes one row per request

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cost;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod usage;

// Re-export main types
pub use cost::{CostCalculator, ModelPricing, PriceTier};
pub use error::TelemetryError;
pub use logging::{build_filter, init_logging};
pub use metrics::Metrics;
pub use usage::{preview, UsageLogWriteError, UsageRecorder, UsageRecorderConfig};
