//! Shared application state.

use crate::auth::AuthKeys;
use crate::orchestrator::{Orchestrator, OrchestratorParts};
use gateway_config::GatewayConfig;
use gateway_core::{AdapterFactory, GatewayError, OverrideStore, ProviderStore, UsageStore};
use gateway_providers::{ApiKeyCipher, HttpAdapterFactory, ProviderRegistry};
use gateway_resilience::{
    CacheBackend, CacheConfig, CounterStore, MemoryCacheBackend, MemoryCounterStore,
    RateLimitConfig, RateLimiter, ResponseCache, RetryConfig, RetryPolicy,
};
use gateway_routing::{OverrideResolver, RouteTarget, RoutingDefaults};
use gateway_telemetry::{CostCalculator, Metrics, ModelPricing, UsageRecorder, UsageRecorderConfig};
use std::sync::Arc;
use std::time::Duration;

/// Prefix for cache and counter keys when no Redis prefix is configured
pub const DEFAULT_KEY_PREFIX: &str = "llm-gateway:";

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Request pipeline
    pub orchestrator: Arc<Orchestrator>,
    /// Provider configuration
    pub registry: ProviderRegistry,
    /// Routing overrides
    pub overrides: Arc<dyn OverrideStore>,
    /// Usage ledger
    pub usage: Arc<dyn UsageStore>,
    /// Per-provider admission, shared with the orchestrator
    pub limiter: Arc<RateLimiter>,
    /// Metrics registry
    pub metrics: Metrics,
    /// Inbound keys
    pub auth: AuthKeys,
    /// Whole-request timeout
    pub request_timeout: Duration,
}

impl AppState {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &self.orchestrator)
            .field("auth", &self.auth)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AppState`].
///
/// Stores and the cipher are required. Ephemeral backends default to
/// in-process implementations and the adapter factory to a pooled HTTP client.
#[derive(Default)]
pub struct AppStateBuilder {
    config: GatewayConfig,
    provider_store: Option<Arc<dyn ProviderStore>>,
    override_store: Option<Arc<dyn OverrideStore>>,
    usage_store: Option<Arc<dyn UsageStore>>,
    cipher: Option<ApiKeyCipher>,
    factory: Option<Arc<dyn AdapterFactory>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    counter_store: Option<Arc<dyn CounterStore>>,
    metrics: Option<Metrics>,
}

impl AppStateBuilder {
    /// Gateway configuration
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Provider store
    #[must_use]
    pub fn provider_store(mut self, store: Arc<dyn ProviderStore>) -> Self {
        self.provider_store = Some(store);
        self
    }

    /// Override store
    #[must_use]
    pub fn override_store(mut self, store: Arc<dyn OverrideStore>) -> Self {
        self.override_store = Some(store);
        self
    }

    /// Usage store
    #[must_use]
    pub fn usage_store(mut self, store: Arc<dyn UsageStore>) -> Self {
        self.usage_store = Some(store);
        self
    }

    /// API key cipher
    #[must_use]
    pub fn cipher(mut self, cipher: ApiKeyCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Adapter factory
    #[must_use]
    pub fn factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Cache backend
    #[must_use]
    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Rate limit counter store
    #[must_use]
    pub fn counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counter_store = Some(store);
        self
    }

    /// Metrics registry
    #[must_use]
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the state
    ///
    /// # Errors
    /// Returns a configuration error when a required component is missing
    pub fn build(self) -> Result<AppState, GatewayError> {
        let config = self.config;
        let missing = |what: &str| GatewayError::configuration(format!("{what} is required"));

        let provider_store = self.provider_store.ok_or_else(|| missing("provider store"))?;
        let override_store = self.override_store.ok_or_else(|| missing("override store"))?;
        let usage_store = self.usage_store.ok_or_else(|| missing("usage store"))?;
        let cipher = self.cipher.ok_or_else(|| missing("API key cipher"))?;

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Metrics::new().map_err(|e| GatewayError::internal(e.to_string()))?,
        };

        let factory: Arc<dyn AdapterFactory> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(HttpAdapterFactory::new(
                config.upstream.timeout,
                config.upstream.connect_timeout,
            )?),
        };

        let key_prefix = config
            .redis
            .as_ref()
            .map_or_else(|| DEFAULT_KEY_PREFIX.to_string(), |r| r.key_prefix.clone());

        let cache_backend: Arc<dyn CacheBackend> = match self.cache_backend {
            Some(backend) => backend,
            None => Arc::new(MemoryCacheBackend::new(config.cache.max_entries)),
        };
        let cache = ResponseCache::new(
            cache_backend,
            CacheConfig {
                enabled: config.cache.enabled,
                ttl: config.cache.ttl,
                key_prefix: key_prefix.clone(),
            },
        );

        let counter_store: Arc<dyn CounterStore> = match self.counter_store {
            Some(store) => store,
            None => Arc::new(MemoryCounterStore::new()),
        };
        let limiter = Arc::new(RateLimiter::new(
            counter_store,
            RateLimitConfig {
                window: config.rate_limit.window,
                key_prefix,
                fail_open: config.rate_limit.fail_open,
            },
        ));

        let retry = RetryPolicy::new(RetryConfig {
            max_retries: config.retry.max_retries,
            base_delay: config.retry.base_delay,
            max_delay: config.retry.max_delay,
            jitter: config.retry.jitter,
            ..RetryConfig::default()
        });

        let defaults = config.routing.services.iter().fold(
            RoutingDefaults::new(RouteTarget::new(
                config.routing.default_provider.clone(),
                config.routing.default_model.clone(),
            )),
            |defaults, (service, route)| {
                defaults.with_service(
                    service.clone(),
                    RouteTarget::new(route.provider.clone(), route.model.clone()),
                )
            },
        );

        let costs = CostCalculator::default().with_entries(config.pricing.iter().map(|p| {
            ModelPricing::new(
                p.provider.clone(),
                p.model.clone(),
                p.input_per_million,
                p.output_per_million,
            )
        }));

        let recorder = UsageRecorder::new(
            Arc::clone(&usage_store),
            UsageRecorderConfig {
                prompt_preview_chars: config.usage.prompt_preview_chars,
                write_attempts: config.usage.write_attempts,
                write_backoff: config.usage.write_backoff,
            },
        )
        .with_metrics(metrics.clone());

        let registry = ProviderRegistry::new(provider_store, cipher);

        let orchestrator = Orchestrator::new(OrchestratorParts {
            registry: registry.clone(),
            resolver: OverrideResolver::new(Arc::clone(&override_store), defaults),
            factory,
            cache,
            limiter: Arc::clone(&limiter),
            retry,
            costs,
            recorder,
            metrics: metrics.clone(),
        });

        Ok(AppState {
            orchestrator: Arc::new(orchestrator),
            registry,
            overrides: override_store,
            usage: usage_store,
            limiter,
            metrics,
            auth: AuthKeys::new(config.server.service_key, config.server.admin_key),
            request_timeout: config.server.request_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_storage::MemoryStore;

    fn cipher() -> ApiKeyCipher {
        ApiKeyCipher::new(&ApiKeyCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_missing_store_is_a_configuration_error() {
        let err = AppState::builder().cipher(cipher()).build().unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn test_build_with_memory_stores() {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::builder()
            .provider_store(store.clone())
            .override_store(store.clone())
            .usage_store(store)
            .cipher(cipher())
            .build()
            .unwrap();
        assert!(!state.auth.admin_enabled());
        assert_eq!(state.request_timeout, GatewayConfig::default().server.request_timeout);
    }
}
