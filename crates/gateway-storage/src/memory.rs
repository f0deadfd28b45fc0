//! In-memory stores for tests and database-less development.

use async_trait::async_trait;
use chrono::Utc;
use gateway_core::{
    CustomerOverride, NewOverride, NewUsageLog, OverrideStore, ProviderConfig, ProviderStore,
    StoreError, UsageLog, UsageQuery, UsageStore, UsageSummary,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Process-local implementation of every store trait
#[derive(Debug, Default)]
pub struct MemoryStore {
    providers: RwLock<BTreeMap<String, ProviderConfig>>,
    overrides: RwLock<Vec<CustomerOverride>>,
    usage: RwLock<Vec<UsageLog>>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of usage rows written
    #[must_use]
    pub fn usage_len(&self) -> usize {
        self.usage.read().len()
    }
}

#[async_trait]
impl ProviderStore for MemoryStore {
    async fn list(&self) -> Result<Vec<ProviderConfig>, StoreError> {
        let mut providers: Vec<_> = self.providers.read().values().cloned().collect();
        providers.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(providers)
    }

    async fn get(&self, name: &str) -> Result<Option<ProviderConfig>, StoreError> {
        Ok(self.providers.read().get(name).cloned())
    }

    async fn upsert(&self, config: &ProviderConfig) -> Result<(), StoreError> {
        let mut providers = self.providers.write();
        let mut config = config.clone();
        config.updated_at = Utc::now();
        if let Some(existing) = providers.get(&config.name) {
            config.created_at = existing.created_at;
        }
        providers.insert(config.name.clone(), config);
        Ok(())
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), StoreError> {
        let mut providers = self.providers.write();
        let config = providers
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found("provider", name))?;
        config.is_enabled = enabled;
        config.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl OverrideStore for MemoryStore {
    async fn for_user(&self, user_id: &str) -> Result<Vec<CustomerOverride>, StoreError> {
        Ok(self
            .overrides
            .read()
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list(&self) -> Result<Vec<CustomerOverride>, StoreError> {
        Ok(self.overrides.read().clone())
    }

    async fn upsert(&self, new: NewOverride) -> Result<CustomerOverride, StoreError> {
        let candidate = CustomerOverride::from_new(new);
        let mut overrides = self.overrides.write();

        if let Some(existing) = overrides
            .iter_mut()
            .find(|o| o.user_id == candidate.user_id && o.service == candidate.service)
        {
            existing.provider = candidate.provider;
            existing.model = candidate.model;
            existing.updated_at = candidate.updated_at;
            return Ok(existing.clone());
        }

        overrides.push(candidate.clone());
        Ok(candidate)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut overrides = self.overrides.write();
        let before = overrides.len();
        overrides.retain(|o| o.id != id);
        Ok(overrides.len() != before)
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn append(&self, entry: &NewUsageLog) -> Result<UsageLog, StoreError> {
        let log = UsageLog::stamp(entry.clone());
        self.usage.write().push(log.clone());
        Ok(log)
    }

    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageLog>, StoreError> {
        Ok(self
            .usage
            .read()
            .iter()
            .rev()
            .filter(|log| query.matches(log))
            .take(query.effective_limit() as usize)
            .cloned()
            .collect())
    }

    async fn summarize(&self, query: &UsageQuery) -> Result<Vec<UsageSummary>, StoreError> {
        let mut totals: BTreeMap<(String, String), UsageSummary> = BTreeMap::new();

        for log in self.usage.read().iter().filter(|log| query.matches(log)) {
            let entry = &log.entry;
            let summary = totals
                .entry((entry.provider.clone(), entry.model.clone()))
                .or_insert_with(|| UsageSummary {
                    provider: entry.provider.clone(),
                    model: entry.model.clone(),
                    requests: 0,
                    cached_requests: 0,
                    failed_requests: 0,
                    input_tokens: 0,
                    output_tokens: 0,
                    cost_usd: 0.0,
                });
            summary.requests += 1;
            summary.cached_requests += u64::from(entry.cached);
            summary.failed_requests += u64::from(entry.is_error());
            summary.input_tokens += u64::from(entry.input_tokens);
            summary.output_tokens += u64::from(entry.output_tokens);
            summary.cost_usd += entry.cost_usd;
        }

        Ok(totals.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_override(user: &str, service: Option<&str>, model: &str) -> NewOverride {
        NewOverride {
            user_id: user.to_string(),
            service: service.map(str::to_string),
            provider: "openai".to_string(),
            model: model.to_string(),
        }
    }

    #[tokio::test]
    async fn test_override_upsert_replaces_same_scope() {
        let store = MemoryStore::new();
        let first = OverrideStore::upsert(&store, new_override("u1", Some("search"), "gpt-4o")).await.unwrap();
        let second = OverrideStore::upsert(&store, new_override("u1", Some("search"), "gpt-4.1")).await.unwrap();
        OverrideStore::upsert(&store, new_override("u1", None, "gpt-4o-mini")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.model, "gpt-4.1");
        assert_eq!(store.for_user("u1").await.unwrap().len(), 2);
        assert!(store.delete(first.id).await.unwrap());
        assert!(!store.delete(first.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_provider_upsert_keeps_created_at() {
        let store = MemoryStore::new();
        let config = ProviderConfig::new("claude", "enc");
        ProviderStore::upsert(&store, &config).await.unwrap();
        let created = ProviderStore::get(&store, "claude").await.unwrap().unwrap().created_at;

        let mut changed = config.clone().with_priority(1);
        changed.created_at = Utc::now() + chrono::Duration::days(1);
        ProviderStore::upsert(&store, &changed).await.unwrap();

        let saved = ProviderStore::get(&store, "claude").await.unwrap().unwrap();
        assert_eq!(saved.created_at, created);
        assert_eq!(saved.priority, 1);

        let err = store.set_enabled("missing", false).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
