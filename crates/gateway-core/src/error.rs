//! Error types for the gateway.
//!
//! Two layers exist. [`ProviderError`] describes what went wrong while talking to
//! one upstream vendor and carries a [`ProviderErrorKind`] that drives the retry
//! decision. [`GatewayError`] is the caller-visible taxonomy produced by the
//! generation pipeline.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Classification of an upstream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Connection could not be established or was reset
    Network,
    /// The upstream did not answer within the configured timeout
    Timeout,
    /// Non-2xx status that is not an authentication failure or a bad request
    Upstream {
        /// HTTP status returned by the vendor
        status: u16,
    },
    /// Credentials were rejected (401/403)
    Authentication,
    /// The vendor rejected the request as invalid (400/404/422)
    InvalidRequest {
        /// HTTP status returned by the vendor
        status: u16,
    },
    /// 2xx response whose body could not be decoded
    MalformedResponse,
}

impl ProviderErrorKind {
    /// Classify an HTTP status code
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            400 | 404 | 413 | 422 => Self::InvalidRequest { status },
            _ => Self::Upstream { status },
        }
    }

    /// Whether this failure may succeed on a later attempt.
    ///
    /// Network errors, timeouts, 408, 429 and 5xx responses are transient.
    #[must_use]
    pub fn is_transient(self) -> bool {
        match self {
            Self::Network | Self::Timeout => true,
            Self::Upstream { status } => status == 408 || status == 429 || status >= 500,
            Self::Authentication | Self::InvalidRequest { .. } | Self::MalformedResponse => false,
        }
    }

    /// Stable label used in logs and usage records
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Upstream { .. } => "upstream_status",
            Self::Authentication => "authentication",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::MalformedResponse => "malformed_response",
        }
    }

    /// HTTP status attached to the failure, if any
    #[must_use]
    pub fn status(self) -> Option<u16> {
        match self {
            Self::Upstream { status } | Self::InvalidRequest { status } => Some(status),
            Self::Authentication | Self::Network | Self::Timeout | Self::MalformedResponse => None,
        }
    }
}

/// Failure raised by a provider adapter
#[derive(Debug, Clone, Error)]
#[error("{provider} {}: {message}", .kind.as_str())]
pub struct ProviderError {
    /// Provider name the adapter is bound to
    pub provider: String,
    /// Failure classification
    pub kind: ProviderErrorKind,
    /// Human readable detail
    pub message: String,
}

impl ProviderError {
    /// Create a new provider error
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    /// Network level failure
    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Network, message)
    }

    /// Upstream timeout
    pub fn timeout(provider: impl Into<String>, after: Duration) -> Self {
        Self::new(
            provider,
            ProviderErrorKind::Timeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }

    /// Error built from a non-2xx status
    pub fn status(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::from_status(status), message)
    }

    /// Response body could not be decoded
    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::MalformedResponse, message)
    }

    /// Whether this failure may succeed on a later attempt
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Main error type for the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request validation errors
    #[error("Validation error: {message}")]
    Validation {
        /// Error message
        message: String,
        /// Field that failed validation
        field: Option<String>,
        /// Error code
        code: String,
    },

    /// Missing or invalid credentials on the inbound call
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Error message
        message: String,
    },

    /// No usable provider/model could be resolved for the caller
    #[error("Routing error: {message}")]
    Routing {
        /// Error message
        message: String,
        /// Provider that resolution landed on, if any
        provider: Option<String>,
    },

    /// The resolved provider has no headroom in the current window
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimited {
        /// Provider whose window is exhausted
        provider: String,
        /// Time until the current window closes
        retry_after: Duration,
    },

    /// Transient upstream failure that survived every retry
    #[error("Provider '{provider}' unavailable after {attempts} attempt(s): {source}")]
    ProviderTransient {
        /// Provider name
        provider: String,
        /// Attempts made, including the first call
        attempts: u32,
        /// Last upstream failure
        #[source]
        source: ProviderError,
    },

    /// Upstream failure that retrying cannot fix
    #[error("Provider '{provider}' rejected the request: {source}")]
    ProviderPermanent {
        /// Provider name
        provider: String,
        /// Upstream failure
        #[source]
        source: ProviderError,
    },

    /// Persistent store failure
    #[error("Storage error: {message}")]
    Storage {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Create a validation error
    pub fn validation(
        message: impl Into<String>,
        field: Option<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field,
            code: code.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a routing error
    pub fn routing(message: impl Into<String>, provider: Option<String>) -> Self {
        Self::Routing {
            message: message.into(),
            provider,
        }
    }

    /// Create a rate limited error
    pub fn rate_limited(provider: impl Into<String>, retry_after: Duration) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            retry_after,
        }
    }

    /// Wrap an adapter failure, choosing transient or permanent from its kind
    #[must_use]
    pub fn from_provider(error: ProviderError, attempts: u32) -> Self {
        let provider = error.provider.clone();
        if error.is_transient() {
            Self::ProviderTransient {
                provider,
                attempts,
                source: error,
            }
        } else {
            Self::ProviderPermanent {
                provider,
                source: error,
            }
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable snake_case code for this error
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Routing { .. } => "routing_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::ProviderTransient { .. } => "provider_unavailable",
            Self::ProviderPermanent { .. } => "provider_error",
            Self::Storage { .. } => "storage_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Whether the caller may reasonably retry the same request later
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ProviderTransient { .. } | Self::Storage { .. }
        )
    }

    /// HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Routing { .. } => 422,
            Self::RateLimited { .. } => 429,
            Self::ProviderPermanent { .. } => 502,
            Self::ProviderTransient { .. } | Self::Storage { .. } => 503,
            Self::Configuration { .. } | Self::Internal { .. } => 500,
        }
    }

    /// Provider involved in the failure, if any
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::RateLimited { provider, .. }
            | Self::ProviderTransient { provider, .. }
            | Self::ProviderPermanent { provider, .. } => Some(provider),
            Self::Routing { provider, .. } => provider.as_deref(),
            _ => None,
        }
    }
}
