//! API error responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::GatewayError;
use serde_json::json;
use std::time::Duration;
use tracing::error;

/// Error rendered as `{"error": {"type", "message"}}`
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Stable error type
    pub code: String,
    /// Human readable message
    pub message: String,
    /// Value for the `Retry-After` header
    pub retry_after: Option<Duration>,
}

impl ApiError {
    /// Create an error with an explicit status and code
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    /// 400 for malformed input
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    /// 401 for missing or wrong credentials
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    /// 404 for unknown resources
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// 500 with a generic message
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// Attach a retry hint
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// Whole seconds, rounded up, never below one
fn retry_after_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &err {
            GatewayError::Internal { .. } | GatewayError::Configuration { .. } => {
                error!(error = %err, "Request failed with an internal error");
                "The gateway could not process the request".to_string()
            }
            _ => err.to_string(),
        };

        let mut api = Self::new(status, err.kind(), message);
        if let GatewayError::RateLimited { retry_after, .. } = err {
            api = api.with_retry_after(retry_after);
        }
        api
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "type": self.code,
                "message": self.message,
            }
        }));

        let mut response = (self.status, body).into_response();
        if let Some(retry_after) = self.retry_after {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs(retry_after)),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::ProviderError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GatewayError::validation("bad", None, "bad"), 400),
            (GatewayError::unauthorized("no key"), 401),
            (GatewayError::routing("disabled", Some("claude".to_string())), 422),
            (GatewayError::rate_limited("claude", Duration::from_secs(3)), 429),
            (
                GatewayError::from_provider(ProviderError::status("openai", 401, "bad key"), 1),
                502,
            ),
            (
                GatewayError::from_provider(ProviderError::status("openai", 503, "down"), 3),
                503,
            ),
            (GatewayError::internal("boom"), 500),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status.as_u16(), status);
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response =
            ApiError::from(GatewayError::rate_limited("claude", Duration::from_millis(1500)))
                .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let api = ApiError::from(GatewayError::internal("pool exploded at 0x1234"));
        assert!(!api.message.contains("0x1234"));
        assert_eq!(api.code, "internal_error");
    }

    #[test]
    fn test_retry_after_rounding() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(60)), 60);
        assert_eq!(retry_after_secs(Duration::from_millis(59_001)), 60);
    }
}
