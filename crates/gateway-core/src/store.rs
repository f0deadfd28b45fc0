//! Persistence seams.
//!
//! The relational implementations live in `gateway-storage`; in-memory versions
//! back tests and database-less development.

use crate::entities::{
    CustomerOverride, NewOverride, NewUsageLog, ProviderConfig, UsageLog, UsageQuery, UsageSummary,
};
use crate::error::GatewayError;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Store failures
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing store could not be reached or the query failed
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Referenced record does not exist
    #[error("{entity} '{key}' not found")]
    NotFound {
        /// Entity name
        entity: &'static str,
        /// Lookup key
        key: String,
    },
}

impl StoreError {
    /// Not-found helper
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        Self::storage(err.to_string())
    }
}

/// Provider configuration records
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Every provider, enabled or not
    async fn list(&self) -> Result<Vec<ProviderConfig>, StoreError>;

    /// One provider by name
    async fn get(&self, name: &str) -> Result<Option<ProviderConfig>, StoreError>;

    /// Insert or replace by name. `created_at` of an existing row is kept.
    async fn upsert(&self, config: &ProviderConfig) -> Result<(), StoreError>;

    /// Soft enable or disable
    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), StoreError>;
}

/// Routing override records
#[async_trait]
pub trait OverrideStore: Send + Sync {
    /// Overrides for one user (any service scope)
    async fn for_user(&self, user_id: &str) -> Result<Vec<CustomerOverride>, StoreError>;

    /// Every override
    async fn list(&self) -> Result<Vec<CustomerOverride>, StoreError>;

    /// Insert, or replace the override with the same (user, service) scope
    async fn upsert(&self, new: NewOverride) -> Result<CustomerOverride, StoreError>;

    /// Remove by id; returns whether a row existed
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Append-only usage ledger
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Append one row
    async fn append(&self, entry: &NewUsageLog) -> Result<UsageLog, StoreError>;

    /// Filtered rows, newest first
    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageLog>, StoreError>;

    /// Totals per provider/model under a filter (`limit` is ignored)
    async fn summarize(&self, query: &UsageQuery) -> Result<Vec<UsageSummary>, StoreError>;
}
