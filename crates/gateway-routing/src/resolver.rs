//! Override resolution.

use gateway_core::{CustomerOverride, GatewayError, OverrideStore, ProviderDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A provider and model pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteTarget {
    /// Provider name
    pub provider: String,
    /// Model id
    pub model: String,
}

impl RouteTarget {
    /// Create a new target
    #[must_use]
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Which layer produced a decision, highest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// Override for the exact user and service
    UserService,
    /// Override covering every service of the user
    User,
    /// Configured default for the calling service
    ServiceDefault,
    /// Configured global default
    GlobalDefault,
}

impl RouteSource {
    /// Stable label for logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserService => "user_service",
            Self::User => "user",
            Self::ServiceDefault => "service_default",
            Self::GlobalDefault => "global_default",
        }
    }
}

/// Outcome of override resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    /// Chosen provider and model
    pub target: RouteTarget,
    /// Layer the choice came from
    pub source: RouteSource,
    /// Id of the override that won, if any
    pub override_id: Option<Uuid>,
}

impl RouteDecision {
    /// Provider name
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.target.provider
    }

    /// Model id
    #[must_use]
    pub fn model(&self) -> &str {
        &self.target.model
    }
}

/// Configured fallbacks below the override layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDefaults {
    /// Global default
    pub global: RouteTarget,
    /// Defaults keyed by calling service
    pub services: HashMap<String, RouteTarget>,
}

impl RoutingDefaults {
    /// Defaults with no per-service entries
    #[must_use]
    pub fn new(global: RouteTarget) -> Self {
        Self {
            global,
            services: HashMap::new(),
        }
    }

    /// Add a per-service default
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>, target: RouteTarget) -> Self {
        self.services.insert(service.into(), target);
        self
    }
}

/// Pick the provider and model for a caller.
///
/// Overrides belonging to other users are ignored, so callers may pass an
/// unfiltered list. The result does not depend on the order of `overrides`.
#[must_use]
pub fn resolve(
    user_id: &str,
    service: &str,
    overrides: &[CustomerOverride],
    defaults: &RoutingDefaults,
) -> RouteDecision {
    let mine = || overrides.iter().filter(|o| o.user_id == user_id);

    if let Some(o) = mine().find(|o| o.service.as_deref() == Some(service)) {
        return from_override(o, RouteSource::UserService);
    }

    if let Some(o) = mine().find(|o| o.is_user_wide()) {
        return from_override(o, RouteSource::User);
    }

    if let Some(target) = defaults.services.get(service) {
        return RouteDecision {
            target: target.clone(),
            source: RouteSource::ServiceDefault,
            override_id: None,
        };
    }

    RouteDecision {
        target: defaults.global.clone(),
        source: RouteSource::GlobalDefault,
        override_id: None,
    }
}

fn from_override(o: &CustomerOverride, source: RouteSource) -> RouteDecision {
    RouteDecision {
        target: RouteTarget::new(&o.provider, &o.model),
        source,
        override_id: Some(o.id),
    }
}

/// Check a decision against the live registry.
///
/// `provider` is the registry lookup for the decided provider; `None` means it
/// is unknown or disabled. Neither case falls through to another layer.
///
/// # Errors
/// Returns a routing error if the provider is unavailable or does not list the
/// decided model.
pub fn ensure_routable(
    decision: RouteDecision,
    provider: Option<&ProviderDescriptor>,
) -> Result<RouteDecision, GatewayError> {
    let Some(descriptor) = provider else {
        return Err(GatewayError::routing(
            format!(
                "provider '{}' is not available (resolved from {})",
                decision.provider(),
                decision.source.as_str()
            ),
            Some(decision.target.provider),
        ));
    };

    if !descriptor.supports_model(decision.model()) {
        return Err(GatewayError::routing(
            format!(
                "model '{}' is not enabled for provider '{}'",
                decision.model(),
                descriptor.name
            ),
            Some(descriptor.name.clone()),
        ));
    }

    Ok(decision)
}

/// Loads a caller's overrides and resolves them against the defaults
pub struct OverrideResolver {
    store: Arc<dyn OverrideStore>,
    defaults: RoutingDefaults,
}

impl OverrideResolver {
    /// Create a new resolver
    pub fn new(store: Arc<dyn OverrideStore>, defaults: RoutingDefaults) -> Self {
        Self { store, defaults }
    }

    /// Configured defaults
    #[must_use]
    pub fn defaults(&self) -> &RoutingDefaults {
        &self.defaults
    }

    /// Resolve the route for a caller
    ///
    /// # Errors
    /// Returns a storage error if overrides cannot be read
    pub async fn route(&self, user_id: &str, service: &str) -> Result<RouteDecision, GatewayError> {
        let overrides = self.store.for_user(user_id).await?;
        let decision = resolve(user_id, service, &overrides, &self.defaults);

        debug!(
            user_id = %user_id,
            service = %service,
            route = %decision.target,
            source = decision.source.as_str(),
            "Resolved route"
        );

        Ok(decision)
    }
}

impl fmt::Debug for OverrideResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideResolver")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_core::{NewOverride, StoreError};
    use parking_lot::RwLock;
    use secrecy::SecretString;

    fn over(user: &str, service: Option<&str>, provider: &str, model: &str) -> CustomerOverride {
        CustomerOverride::from_new(NewOverride {
            user_id: user.to_string(),
            service: service.map(str::to_string),
            provider: provider.to_string(),
            model: model.to_string(),
        })
    }

    fn defaults() -> RoutingDefaults {
        RoutingDefaults::new(RouteTarget::new("claude", "claude-sonnet-4-5-20250929"))
            .with_service("billing", RouteTarget::new("deepseek", "deepseek-chat"))
    }

    fn descriptor(name: &str, models: &[&str]) -> ProviderDescriptor {
        ProviderDescriptor {
            name: name.to_string(),
            display_name: name.to_string(),
            api_key: SecretString::new("k".to_string()),
            base_url: None,
            models: models.iter().map(|m| (*m).to_string()).collect(),
            priority: 1,
            rate_limit_rpm: 0,
            rate_limit_tpm: 0,
            settings: None,
            extra_config: serde_json::Map::new(),
        }
    }

    fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn test_global_default_without_overrides() {
        let d = resolve("u1", "search", &[], &defaults());
        assert_eq!(d.source, RouteSource::GlobalDefault);
        assert_eq!(d.target, RouteTarget::new("claude", "claude-sonnet-4-5-20250929"));
        assert!(d.override_id.is_none());
    }

    #[test]
    fn test_service_default() {
        let d = resolve("u1", "billing", &[], &defaults());
        assert_eq!(d.source, RouteSource::ServiceDefault);
        assert_eq!(d.provider(), "deepseek");
    }

    #[test]
    fn test_other_users_and_services_are_ignored() {
        let overrides = vec![
            over("u2", Some("search"), "openai", "gpt-4o"),
            over("u2", None, "groq", "llama"),
            over("u1", Some("billing"), "mistral", "mistral-small-latest"),
        ];
        let d = resolve("u1", "search", &overrides, &defaults());
        assert_eq!(d.source, RouteSource::GlobalDefault);
    }

    #[test]
    fn test_precedence_holds_for_every_layer_combination_and_order() {
        let exact = over("u1", Some("billing"), "openai", "gpt-4o");
        let wide = over("u1", None, "groq", "llama-3.3-70b-versatile");
        let noise = over("u9", Some("billing"), "xai", "grok-3-mini");

        for mask in 0u8..8 {
            let mut layers = vec![noise.clone()];
            if mask & 1 != 0 {
                layers.push(exact.clone());
            }
            if mask & 2 != 0 {
                layers.push(wide.clone());
            }
            let with_service_default = mask & 4 != 0;
            let defaults = if with_service_default {
                defaults()
            } else {
                RoutingDefaults::new(RouteTarget::new("claude", "claude-sonnet-4-5-20250929"))
            };

            let expected = if mask & 1 != 0 {
                RouteSource::UserService
            } else if mask & 2 != 0 {
                RouteSource::User
            } else if with_service_default {
                RouteSource::ServiceDefault
            } else {
                RouteSource::GlobalDefault
            };

            for order in permutations(&layers) {
                let d = resolve("u1", "billing", &order, &defaults);
                assert_eq!(d.source, expected, "mask {mask:03b}");
                match expected {
                    RouteSource::UserService => assert_eq!(d.override_id, Some(exact.id)),
                    RouteSource::User => assert_eq!(d.override_id, Some(wide.id)),
                    _ => assert!(d.override_id.is_none()),
                }
            }
        }
    }

    #[test]
    fn test_ensure_routable_fails_closed_on_missing_provider() {
        let d = resolve("u1", "search", &[over("u1", None, "openai", "gpt-4o")], &defaults());
        let err = ensure_routable(d, None).unwrap_err();
        assert!(matches!(err, GatewayError::Routing { .. }));
        assert_eq!(err.provider(), Some("openai"));
    }

    #[test]
    fn test_ensure_routable_checks_model_list() {
        let d = resolve("u1", "search", &[over("u1", None, "openai", "gpt-4o")], &defaults());

        let restricted = descriptor("openai", &["gpt-4o-mini"]);
        assert!(ensure_routable(d.clone(), Some(&restricted)).is_err());

        let listed = descriptor("openai", &["gpt-4o", "gpt-4o-mini"]);
        assert_eq!(ensure_routable(d.clone(), Some(&listed)).unwrap(), d);

        let open = descriptor("openai", &[]);
        assert!(ensure_routable(d, Some(&open)).is_ok());
    }

    #[derive(Default)]
    struct TestStore {
        rows: RwLock<Vec<CustomerOverride>>,
        broken: bool,
    }

    #[async_trait]
    impl OverrideStore for TestStore {
        async fn for_user(&self, user_id: &str) -> Result<Vec<CustomerOverride>, StoreError> {
            if self.broken {
                return Err(StoreError::Unavailable("down".to_string()));
            }
            Ok(self.rows.read().iter().filter(|o| o.user_id == user_id).cloned().collect())
        }

        async fn list(&self) -> Result<Vec<CustomerOverride>, StoreError> {
            Ok(self.rows.read().clone())
        }

        async fn upsert(&self, new: NewOverride) -> Result<CustomerOverride, StoreError> {
            let o = CustomerOverride::from_new(new);
            self.rows.write().push(o.clone());
            Ok(o)
        }

        async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
            let mut rows = self.rows.write();
            let before = rows.len();
            rows.retain(|o| o.id != id);
            Ok(rows.len() != before)
        }
    }

    #[tokio::test]
    async fn test_resolver_reads_store() {
        let store = Arc::new(TestStore::default());
        store
            .upsert(NewOverride {
                user_id: "u1".to_string(),
                service: Some("search".to_string()),
                provider: "openai".to_string(),
                model: "gpt-4o".to_string(),
            })
            .await
            .unwrap();

        let resolver = OverrideResolver::new(store, defaults());
        let d = resolver.route("u1", "search").await.unwrap();
        assert_eq!(d.source, RouteSource::UserService);
        assert_eq!(d.model(), "gpt-4o");

        let d = resolver.route("u2", "search").await.unwrap();
        assert_eq!(d.source, RouteSource::GlobalDefault);
    }

    #[tokio::test]
    async fn test_resolver_surfaces_storage_errors() {
        let store = Arc::new(TestStore {
            broken: true,
            ..Default::default()
        });
        let resolver = OverrideResolver::new(store, defaults());
        let err = resolver.route("u1", "search").await.unwrap_err();
        assert!(matches!(err, GatewayError::Storage { .. }));
    }
}
