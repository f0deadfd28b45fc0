//! Persisted records: provider configuration, routing overrides and the usage ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an adapter presents the API key to the vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `x-api-key: <key>`
    XApiKey,
    /// Key sent verbatim in a named header (e.g. `api-key`)
    Header {
        /// Header name
        name: String,
    },
}

/// Vendor settings, tagged by protocol family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ProviderSettings {
    /// Anthropic Messages API
    Anthropic {
        /// Value for the `anthropic-version` header
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_version: Option<String>,
    },
    /// OpenAI Chat Completions protocol and compatible vendors
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible {
        /// Model used when routing does not name one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_model: Option<String>,
        /// Authentication header style
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth: Option<AuthScheme>,
        /// `OpenAI-Organization` header value
        #[serde(default, skip_serializing_if = "Option::is_none")]
        organization: Option<String>,
        /// Vendor ceiling for output tokens
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_output_tokens: Option<u32>,
    },
}

/// One upstream vendor as stored by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name (e.g. `claude`, `openai`)
    pub name: String,
    /// Human readable name
    pub display_name: String,
    /// API key encrypted at rest
    #[serde(default, skip_serializing)]
    pub api_key_encrypted: String,
    /// Custom base URL; vendor default when absent
    pub base_url: Option<String>,
    /// Enabled model ids; empty means no restriction
    pub models: Vec<String>,
    /// Whether routing may select this provider
    pub is_enabled: bool,
    /// Lower is preferred
    pub priority: i32,
    /// Requests per minute; zero or negative means unlimited
    pub rate_limit_rpm: i64,
    /// Tokens per minute; zero or negative means unlimited
    pub rate_limit_tpm: i64,
    /// Protocol-family settings
    pub settings: Option<ProviderSettings>,
    /// Vendor-specific fields with no typed home
    pub extra_config: serde_json::Map<String, serde_json::Value>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl ProviderConfig {
    /// New enabled provider with default policy
    pub fn new(name: impl Into<String>, api_key_encrypted: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            display_name: name.clone(),
            name,
            api_key_encrypted: api_key_encrypted.into(),
            base_url: None,
            models: Vec::new(),
            is_enabled: true,
            priority: 100,
            rate_limit_rpm: 0,
            rate_limit_tpm: 0,
            settings: None,
            extra_config: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Set a custom base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set enabled models
    #[must_use]
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Set priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the requests-per-minute ceiling
    #[must_use]
    pub fn with_rate_limit_rpm(mut self, rpm: i64) -> Self {
        self.rate_limit_rpm = rpm;
        self
    }

    /// Set the tokens-per-minute ceiling
    #[must_use]
    pub fn with_rate_limit_tpm(mut self, tpm: i64) -> Self {
        self.rate_limit_tpm = tpm;
        self
    }

    /// Set protocol settings
    #[must_use]
    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set enabled flag
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.is_enabled = enabled;
        self
    }
}

/// Per-caller routing exception
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerOverride {
    /// Record id
    pub id: Uuid,
    /// User the override applies to
    pub user_id: String,
    /// Calling service; `None` applies to every service of the user
    pub service: Option<String>,
    /// Target provider
    pub provider: String,
    /// Target model
    pub model: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or replacing an override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOverride {
    /// User the override applies to
    pub user_id: String,
    /// Calling service scope
    #[serde(default)]
    pub service: Option<String>,
    /// Target provider
    pub provider: String,
    /// Target model
    pub model: String,
}

impl CustomerOverride {
    /// Materialize a new override record
    #[must_use]
    pub fn from_new(new: NewOverride) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            service: new.service.filter(|s| !s.is_empty()),
            provider: new.provider,
            model: new.model,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this override targets every service of its user
    #[must_use]
    pub fn is_user_wide(&self) -> bool {
        self.service.is_none()
    }
}

/// Usage row as it is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUsageLog {
    /// Inbound request id
    pub request_id: String,
    /// End user
    pub user_id: String,
    /// Calling service
    pub service: String,
    /// Task label
    pub task_type: String,
    /// Provider used; empty when resolution never completed
    pub provider: String,
    /// Model used; empty when resolution never completed
    pub model: String,
    /// Prompt tokens
    pub input_tokens: u32,
    /// Completion tokens
    pub output_tokens: u32,
    /// Cost in USD
    pub cost_usd: f64,
    /// End-to-end latency
    pub latency_ms: u64,
    /// Served from cache
    pub cached: bool,
    /// Error message for failed calls
    pub error_message: Option<String>,
    /// Stable error code for failed calls
    pub error_kind: Option<String>,
    /// First characters of the prompt
    pub prompt_preview: String,
}

impl NewUsageLog {
    /// Whether the call failed
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error_kind.is_some()
    }
}

/// Persisted usage row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLog {
    /// Row id
    pub id: Uuid,
    /// Write time
    pub created_at: DateTime<Utc>,
    /// Row content
    #[serde(flatten)]
    pub entry: NewUsageLog,
}

impl UsageLog {
    /// Stamp a new entry with id and time
    #[must_use]
    pub fn stamp(entry: NewUsageLog) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            entry,
        }
    }
}

/// Filter for usage reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageQuery {
    /// Only rows for this user
    #[serde(default)]
    pub user_id: Option<String>,
    /// Only rows for this service
    #[serde(default)]
    pub service: Option<String>,
    /// Only rows for this provider
    #[serde(default)]
    pub provider: Option<String>,
    /// Rows at or after this time
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Rows before this time
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    /// Page size
    #[serde(default)]
    pub limit: Option<u32>,
}

impl UsageQuery {
    /// Largest page returned by a single read
    pub const MAX_LIMIT: u32 = 1000;

    /// Page size clamped to `MAX_LIMIT`
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(100).clamp(1, Self::MAX_LIMIT)
    }

    /// Whether a row passes this filter
    #[must_use]
    pub fn matches(&self, log: &UsageLog) -> bool {
        self.user_id.as_ref().map_or(true, |u| *u == log.entry.user_id)
            && self.service.as_ref().map_or(true, |s| *s == log.entry.service)
            && self.provider.as_ref().map_or(true, |p| *p == log.entry.provider)
            && self.since.map_or(true, |t| log.created_at >= t)
            && self.until.map_or(true, |t| log.created_at < t)
    }
}

/// Aggregate usage for one provider/model pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Provider
    pub provider: String,
    /// Model
    pub model: String,
    /// Row count
    pub requests: u64,
    /// Rows served from cache
    pub cached_requests: u64,
    /// Rows with an error
    pub failed_requests: u64,
    /// Sum of prompt tokens
    pub input_tokens: u64,
    /// Sum of completion tokens
    pub output_tokens: u64,
    /// Sum of cost
    pub cost_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_settings_tagging() {
        let settings: ProviderSettings = serde_json::from_value(serde_json::json!({
            "family": "openai_compatible",
            "auth": {"type": "header", "name": "api-key"},
            "max_output_tokens": 4096
        }))
        .unwrap();
        match settings {
            ProviderSettings::OpenAiCompatible {
                auth, max_output_tokens, ..
            } => {
                assert_eq!(
                    auth,
                    Some(AuthScheme::Header {
                        name: "api-key".to_string()
                    })
                );
                assert_eq!(max_output_tokens, Some(4096));
            }
            other => panic!("unexpected settings: {other:?}"),
        }
    }

    #[test]
    fn test_override_from_new_drops_empty_service() {
        let o = CustomerOverride::from_new(NewOverride {
            user_id: "u1".to_string(),
            service: Some(String::new()),
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
        });
        assert!(o.is_user_wide());
    }

    #[test]
    fn test_usage_query_limit_and_match() {
        let q = UsageQuery {
            limit: Some(50_000),
            provider: Some("claude".to_string()),
            ..Default::default()
        };
        assert_eq!(q.effective_limit(), UsageQuery::MAX_LIMIT);

        let log = UsageLog::stamp(NewUsageLog {
            request_id: "r".to_string(),
            user_id: "u".to_string(),
            service: "s".to_string(),
            task_type: "general".to_string(),
            provider: "claude".to_string(),
            model: "m".to_string(),
            input_tokens: 1,
            output_tokens: 1,
            cost_usd: 0.0,
            latency_ms: 1,
            cached: false,
            error_message: None,
            error_kind: None,
            prompt_preview: "hello".to_string(),
        });
        assert!(q.matches(&log));
        assert!(!UsageQuery {
            provider: Some("openai".to_string()),
            ..Default::default()
        }
        .matches(&log));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = ProviderConfig::new("claude", "ciphertext");
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("api_key_encrypted").is_none());
    }
}
