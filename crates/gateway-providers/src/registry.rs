//! Provider registry.
//!
//! A read projection over the provider store. Every call reads the store, so a
//! provider disabled by an administrator stops being routable on the next
//! request without any cache invalidation.

use crate::crypto::ApiKeyCipher;
use chrono::Utc;
use gateway_core::{
    GatewayError, ProviderConfig, ProviderDescriptor, ProviderSettings, ProviderStore, StoreError,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Provider summary for health reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    /// Provider name
    pub name: String,
    /// Human readable name
    pub display_name: String,
    /// Whether routing may select it
    pub enabled: bool,
    /// Number of enabled models (zero means unrestricted)
    pub model_count: usize,
    /// Lower is preferred
    pub priority: i32,
    /// Requests per minute ceiling; non-positive means unlimited
    pub rate_limit_rpm: i64,
}

/// Create-or-patch input for a provider.
///
/// Fields left as `None` keep their stored value. A new provider needs an API key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderUpdate {
    /// Provider name
    #[serde(default)]
    pub name: String,
    /// Human readable name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Plaintext API key; encrypted before it is stored
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Custom base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// Enabled models
    #[serde(default)]
    pub models: Option<Vec<String>>,
    /// Enabled flag
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Priority
    #[serde(default)]
    pub priority: Option<i32>,
    /// Requests per minute
    #[serde(default)]
    pub rate_limit_rpm: Option<i64>,
    /// Tokens per minute
    #[serde(default)]
    pub rate_limit_tpm: Option<i64>,
    /// Protocol settings
    #[serde(default)]
    pub settings: Option<ProviderSettings>,
    /// Untyped vendor fields
    #[serde(default)]
    pub extra_config: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Registry of configured providers
#[derive(Clone)]
pub struct ProviderRegistry {
    store: Arc<dyn ProviderStore>,
    cipher: ApiKeyCipher,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    /// Create a registry over a store
    pub fn new(store: Arc<dyn ProviderStore>, cipher: ApiKeyCipher) -> Self {
        Self { store, cipher }
    }

    /// Enabled providers ordered by priority, then name.
    ///
    /// Providers whose key cannot be decrypted are skipped and logged.
    pub async fn list_enabled(&self) -> Result<Vec<ProviderDescriptor>, GatewayError> {
        let mut configs: Vec<ProviderConfig> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|c| c.is_enabled)
            .collect();
        configs.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));

        let mut descriptors = Vec::with_capacity(configs.len());
        for config in configs {
            match self.describe(config) {
                Ok(d) => descriptors.push(d),
                Err(e) => error!(error = %e, "Skipping provider with unusable credentials"),
            }
        }
        Ok(descriptors)
    }

    /// Descriptor for an enabled provider; `None` when unknown or disabled
    pub async fn get(&self, name: &str) -> Result<Option<ProviderDescriptor>, GatewayError> {
        match self.store.get(name).await? {
            Some(config) if config.is_enabled => self.describe(config).map(Some),
            _ => Ok(None),
        }
    }

    /// Every provider with its status, ordered like `list_enabled`
    pub async fn list_all(&self) -> Result<Vec<ProviderStatus>, GatewayError> {
        let mut configs = self.store.list().await?;
        configs.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(configs
            .into_iter()
            .map(|c| ProviderStatus {
                model_count: c.models.len(),
                name: c.name,
                display_name: c.display_name,
                enabled: c.is_enabled,
                priority: c.priority,
                rate_limit_rpm: c.rate_limit_rpm,
            })
            .collect())
    }

    /// Raw stored configurations (keys stay encrypted)
    pub async fn configs(&self) -> Result<Vec<ProviderConfig>, GatewayError> {
        Ok(self.store.list().await?)
    }

    /// Create or patch a provider
    pub async fn upsert(&self, update: ProviderUpdate) -> Result<ProviderConfig, GatewayError> {
        let name = update.name.trim().to_string();
        if name.is_empty() {
            return Err(GatewayError::validation(
                "provider name cannot be empty",
                Some("name".to_string()),
                "empty_name",
            ));
        }

        let encrypted_key = match &update.api_key {
            Some(key) if !key.expose_secret().is_empty() => Some(
                self.cipher
                    .encrypt(key.expose_secret())
                    .map_err(|e| GatewayError::internal(e.to_string()))?,
            ),
            _ => None,
        };

        let mut config = match self.store.get(&name).await? {
            Some(existing) => existing,
            None => {
                let key = encrypted_key.clone().ok_or_else(|| {
                    GatewayError::validation(
                        format!("api_key is required to create provider '{name}'"),
                        Some("api_key".to_string()),
                        "missing_api_key",
                    )
                })?;
                ProviderConfig::new(name.clone(), key)
            }
        };

        if let Some(key) = encrypted_key {
            config.api_key_encrypted = key;
        }
        if let Some(display_name) = update.display_name {
            config.display_name = display_name;
        }
        if let Some(base_url) = update.base_url {
            config.base_url = Some(base_url).filter(|u| !u.trim().is_empty());
        }
        if let Some(models) = update.models {
            config.models = models;
        }
        if let Some(enabled) = update.enabled {
            config.is_enabled = enabled;
        }
        if let Some(priority) = update.priority {
            config.priority = priority;
        }
        if let Some(rpm) = update.rate_limit_rpm {
            config.rate_limit_rpm = rpm;
        }
        if let Some(tpm) = update.rate_limit_tpm {
            config.rate_limit_tpm = tpm;
        }
        if let Some(settings) = update.settings {
            config.settings = Some(settings);
        }
        if let Some(extra) = update.extra_config {
            config.extra_config = extra;
        }
        config.updated_at = Utc::now();

        self.store.upsert(&config).await?;
        info!(provider = %config.name, enabled = config.is_enabled, "Provider configuration saved");
        Ok(config)
    }

    /// Soft enable or disable
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), GatewayError> {
        match self.store.set_enabled(name, enabled).await {
            Ok(()) => {
                info!(provider = %name, enabled, "Provider enabled flag changed");
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => Err(GatewayError::validation(
                format!("unknown provider '{name}'"),
                Some("name".to_string()),
                "unknown_provider",
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert providers that are not stored yet. Existing rows are left untouched.
    pub async fn seed(&self, seeds: Vec<ProviderUpdate>) -> Result<usize, GatewayError> {
        let mut inserted = 0;
        for seed in seeds {
            if self.store.get(&seed.name).await?.is_some() {
                continue;
            }
            let name = seed.name.clone();
            self.upsert(seed).await?;
            info!(provider = %name, "Seeded provider from configuration");
            inserted += 1;
        }
        Ok(inserted)
    }

    fn describe(&self, config: ProviderConfig) -> Result<ProviderDescriptor, GatewayError> {
        let api_key = self.cipher.decrypt(&config.api_key_encrypted).map_err(|e| {
            GatewayError::configuration(format!(
                "credentials for provider '{}' cannot be decrypted: {e}",
                config.name
            ))
        })?;

        Ok(ProviderDescriptor {
            name: config.name,
            display_name: config.display_name,
            api_key,
            base_url: config.base_url,
            models: config.models,
            priority: config.priority,
            rate_limit_rpm: config.rate_limit_rpm,
            rate_limit_tpm: config.rate_limit_tpm,
            settings: config.settings,
            extra_config: config.extra_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::RwLock;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct TestStore {
        rows: RwLock<BTreeMap<String, ProviderConfig>>,
    }

    #[async_trait]
    impl ProviderStore for TestStore {
        async fn list(&self) -> Result<Vec<ProviderConfig>, StoreError> {
            Ok(self.rows.read().values().cloned().collect())
        }

        async fn get(&self, name: &str) -> Result<Option<ProviderConfig>, StoreError> {
            Ok(self.rows.read().get(name).cloned())
        }

        async fn upsert(&self, config: &ProviderConfig) -> Result<(), StoreError> {
            self.rows.write().insert(config.name.clone(), config.clone());
            Ok(())
        }

        async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), StoreError> {
            let mut rows = self.rows.write();
            let row = rows
                .get_mut(name)
                .ok_or_else(|| StoreError::not_found("provider", name))?;
            row.is_enabled = enabled;
            Ok(())
        }
    }

    fn registry() -> ProviderRegistry {
        let cipher = ApiKeyCipher::new(&ApiKeyCipher::generate_key()).unwrap();
        ProviderRegistry::new(Arc::new(TestStore::default()), cipher)
    }

    fn update(name: &str, priority: i32) -> ProviderUpdate {
        ProviderUpdate {
            name: name.to_string(),
            api_key: Some(SecretString::new(format!("key-{name}"))),
            priority: Some(priority),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_enabled_orders_by_priority() {
        let registry = registry();
        registry.upsert(update("openai", 20)).await.unwrap();
        registry.upsert(update("claude", 10)).await.unwrap();
        registry.upsert(update("groq", 10)).await.unwrap();

        let names: Vec<_> = registry
            .list_enabled()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["claude", "groq", "openai"]);
    }

    #[tokio::test]
    async fn test_disabled_and_unknown_are_indistinguishable() {
        let registry = registry();
        registry.upsert(update("claude", 1)).await.unwrap();
        registry.set_enabled("claude", false).await.unwrap();

        assert!(registry.get("claude").await.unwrap().is_none());
        assert!(registry.get("nope").await.unwrap().is_none());
        assert!(registry.list_enabled().await.unwrap().is_empty());

        let all = registry.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].enabled);
    }

    #[tokio::test]
    async fn test_key_is_encrypted_and_decrypted() {
        let registry = registry();
        let stored = registry.upsert(update("claude", 1)).await.unwrap();
        assert_ne!(stored.api_key_encrypted, "key-claude");

        let descriptor = registry.get("claude").await.unwrap().unwrap();
        assert_eq!(descriptor.api_key.expose_secret(), "key-claude");
    }

    #[tokio::test]
    async fn test_patch_keeps_existing_key() {
        let registry = registry();
        registry.upsert(update("claude", 1)).await.unwrap();
        registry
            .upsert(ProviderUpdate {
                name: "claude".to_string(),
                rate_limit_rpm: Some(30),
                ..Default::default()
            })
            .await
            .unwrap();

        let descriptor = registry.get("claude").await.unwrap().unwrap();
        assert_eq!(descriptor.rate_limit_rpm, 30);
        assert_eq!(descriptor.api_key.expose_secret(), "key-claude");
    }

    #[tokio::test]
    async fn test_new_provider_requires_key() {
        let registry = registry();
        let err = registry
            .upsert(ProviderUpdate {
                name: "openai".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_seed_does_not_overwrite() {
        let registry = registry();
        registry.upsert(update("claude", 5)).await.unwrap();
        let inserted = registry
            .seed(vec![update("claude", 99), update("openai", 10)])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(registry.get("claude").await.unwrap().unwrap().priority, 5);
    }

    #[tokio::test]
    async fn test_set_enabled_unknown_provider() {
        let registry = registry();
        assert!(matches!(
            registry.set_enabled("ghost", true).await,
            Err(GatewayError::Validation { .. })
        ));
    }
}
