//! Health endpoints.

use axum::{extract::State, Json};
use gateway_core::GatewayError;
use gateway_providers::ProviderStatus;
use gateway_resilience::ProviderLimits;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{error::ApiError, state::AppState};

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests
    pub status: String,
    /// Gateway version
    pub version: String,
}

/// Provider status plus its live request budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// Registry view of the provider
    #[serde(flatten)]
    pub status: ProviderStatus,
    /// Requests left in the current rate window; `null` when unlimited or
    /// the counter backend is unreachable
    pub remaining_rpm: Option<i64>,
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /health/providers`: every provider, enabled or not
pub async fn providers(State(state): State<AppState>) -> Result<Json<Vec<ProviderHealth>>, ApiError> {
    let statuses = state.registry.list_all().await?;

    let mut report = Vec::with_capacity(statuses.len());
    for status in statuses {
        let remaining_rpm = state
            .limiter
            .remaining(&status.name, ProviderLimits::new(status.rate_limit_rpm, 0))
            .await;
        report.push(ProviderHealth {
            status,
            remaining_rpm,
        });
    }
    Ok(Json(report))
}

/// Log the routable providers at startup and flag a default route that
/// points at a provider nobody can reach.
///
/// Returns the enabled provider names in routing order.
///
/// # Errors
/// Returns an error when the provider store cannot be read
pub async fn startup_check(state: &AppState, default_provider: &str) -> Result<Vec<String>, GatewayError> {
    let names: Vec<String> = state
        .registry
        .list_enabled()
        .await?
        .into_iter()
        .map(|d| d.name)
        .collect();

    if names.is_empty() {
        warn!("No enabled providers, every generate call will fail until one is added");
    } else {
        info!(providers = ?names, "Routable providers");
    }
    if !names.iter().any(|n| n == default_provider) {
        warn!(
            provider = %default_provider,
            "Default provider is not enabled, requests without an override will fail"
        );
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_providers::{ApiKeyCipher, ProviderUpdate};
    use gateway_storage::MemoryStore;
    use secrecy::SecretString;
    use std::sync::Arc;

    fn test_state() -> AppState {
        let store = Arc::new(MemoryStore::new());
        AppState::builder()
            .provider_store(store.clone())
            .override_store(store.clone())
            .usage_store(store)
            .cipher(ApiKeyCipher::new(&ApiKeyCipher::generate_key()).unwrap())
            .build()
            .unwrap()
    }

    fn provider(name: &str, priority: i32, rpm: i64) -> ProviderUpdate {
        ProviderUpdate {
            name: name.to_string(),
            api_key: Some(SecretString::new(format!("key-{name}"))),
            priority: Some(priority),
            rate_limit_rpm: Some(rpm),
            ..ProviderUpdate::default()
        }
    }

    #[tokio::test]
    async fn test_startup_check_lists_enabled_in_priority_order() {
        let state = test_state();
        state.registry.upsert(provider("openai", 20, 0)).await.unwrap();
        state.registry.upsert(provider("claude", 10, 0)).await.unwrap();
        state.registry.upsert(provider("deepseek", 5, 0)).await.unwrap();
        state.registry.set_enabled("deepseek", false).await.unwrap();

        let names = startup_check(&state, "claude").await.unwrap();
        assert_eq!(names, ["claude", "openai"]);
    }

    #[tokio::test]
    async fn test_startup_check_tolerates_missing_default() {
        let state = test_state();
        state.registry.upsert(provider("openai", 10, 0)).await.unwrap();

        let names = startup_check(&state, "claude").await.unwrap();
        assert_eq!(names, ["openai"]);
        assert!(startup_check(&test_state(), "claude").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_health_reports_remaining_budget() {
        let state = test_state();
        state.registry.upsert(provider("claude", 10, 5)).await.unwrap();
        state.registry.upsert(provider("openai", 20, 0)).await.unwrap();

        for _ in 0..2 {
            let admission = state.limiter.check("claude", ProviderLimits::new(5, 0)).await;
            assert!(admission.is_allowed());
        }

        let Json(report) = providers(State(state)).await.unwrap();
        let claude = report.iter().find(|p| p.status.name == "claude").unwrap();
        let openai = report.iter().find(|p| p.status.name == "openai").unwrap();
        assert_eq!(claude.remaining_rpm, Some(3));
        assert_eq!(openai.remaining_rpm, None);
    }
}
