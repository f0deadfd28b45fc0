//! # Gateway Core
//!
//! Core types, traits, and error handling for the LLM Gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Request and response types
//! - Provider adapter and factory traits
//! - Persisted entities and store traits
//! - Error types and handling
//! - Validated domain types (newtypes)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod entities;
pub mod error;
pub mod provider;
pub mod request;
pub mod response;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use entities::{
    AuthScheme, CustomerOverride, NewOverride, NewUsageLog, ProviderConfig, ProviderSettings,
    UsageLog, UsageQuery, UsageSummary,
};
pub use error::{GatewayError, GatewayResult, ProviderError, ProviderErrorKind};
pub use provider::{AdapterFactory, Protocol, ProviderAdapter, ProviderDescriptor};
pub use request::{normalize_text, CompletionRequest, GenerateRequest, SamplingParams};
pub use response::{duration_millis, estimate_tokens, Completion, GenerateResponse};
pub use store::{OverrideStore, ProviderStore, StoreError, UsageStore};
pub use types::{MaxTokens, RequestId, Temperature, TypeValidationError};
