//! Inbound key checks.
//!
//! Downstream services present `X-Service-Key` on `/generate`; operators present
//! `X-Admin-Key` on `/admin`. Keys are compared in constant time.

use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use gateway_providers::constant_time_eq;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, warn};

/// Header carrying the service key
pub const SERVICE_KEY_HEADER: &str = "x-service-key";
/// Header carrying the admin key
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Configured inbound keys
#[derive(Clone, Default)]
pub struct AuthKeys {
    service_key: Option<Arc<SecretString>>,
    admin_key: Option<Arc<SecretString>>,
}

impl AuthKeys {
    /// Create from optional keys; blank keys count as absent
    pub fn new(service_key: Option<SecretString>, admin_key: Option<SecretString>) -> Self {
        let keep = |key: Option<SecretString>| {
            key.filter(|k| !k.expose_secret().trim().is_empty())
                .map(Arc::new)
        };
        Self {
            service_key: keep(service_key),
            admin_key: keep(admin_key),
        }
    }

    /// Whether `/generate` requires a service key
    #[must_use]
    pub fn service_key_required(&self) -> bool {
        self.service_key.is_some()
    }

    /// Whether admin routes are mounted
    #[must_use]
    pub fn admin_enabled(&self) -> bool {
        self.admin_key.is_some()
    }

    fn check(expected: Option<&SecretString>, headers: &HeaderMap, header: &str) -> Result<(), ApiError> {
        let Some(expected) = expected else {
            return Ok(());
        };

        let presented = headers
            .get(header)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized(format!("Missing {header} header")))?;

        if constant_time_eq(presented.as_bytes(), expected.expose_secret().as_bytes()) {
            Ok(())
        } else {
            Err(ApiError::unauthorized(format!("Invalid {header} header")))
        }
    }
}

impl std::fmt::Debug for AuthKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthKeys")
            .field("service_key", &self.service_key.is_some())
            .field("admin_key", &self.admin_key.is_some())
            .finish()
    }
}

/// Reject `/generate` calls without the service key
pub async fn require_service_key(
    State(keys): State<AuthKeys>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(err) = AuthKeys::check(keys.service_key.as_deref(), request.headers(), SERVICE_KEY_HEADER) {
        warn!(path = %request.uri().path(), error = %err.message, "Service key rejected");
        return Err(err);
    }
    debug!("Service key accepted");
    Ok(next.run(request).await)
}

/// Reject admin calls without the admin key
pub async fn require_admin_key(
    State(keys): State<AuthKeys>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if keys.admin_key.is_none() {
        return Err(ApiError::not_found("Admin API is disabled"));
    }
    if let Err(err) = AuthKeys::check(keys.admin_key.as_deref(), request.headers(), ADMIN_KEY_HEADER) {
        warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Admin key rejected"
        );
        return Err(err);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SERVICE_KEY_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_check() {
        let expected = SecretString::new("svc-secret".to_string());
        assert!(AuthKeys::check(Some(&expected), &headers("svc-secret"), SERVICE_KEY_HEADER).is_ok());
        assert!(AuthKeys::check(Some(&expected), &headers("svc-wrong!"), SERVICE_KEY_HEADER).is_err());
        assert!(AuthKeys::check(Some(&expected), &HeaderMap::new(), SERVICE_KEY_HEADER).is_err());
        assert!(AuthKeys::check(None, &HeaderMap::new(), SERVICE_KEY_HEADER).is_ok());
    }

    #[test]
    fn test_blank_keys_are_absent() {
        let keys = AuthKeys::new(Some(SecretString::new("  ".to_string())), None);
        assert!(!keys.service_key_required());
        assert!(!keys.admin_enabled());
        assert!(!format!("{keys:?}").contains("  "));
    }
}
