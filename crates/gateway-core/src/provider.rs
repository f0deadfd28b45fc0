//! Provider abstractions shared by adapters, the registry and the orchestrator.

use crate::entities::ProviderSettings;
use crate::error::{GatewayError, ProviderError};
use crate::request::CompletionRequest;
use crate::response::Completion;
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;

/// Wire protocol spoken by an upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Anthropic Messages API
    Anthropic,
    /// OpenAI Chat Completions and compatible vendors
    OpenAiCompatible,
}

impl Protocol {
    /// Stable label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAiCompatible => "openai_compatible",
        }
    }
}

/// Decrypted, ready-to-use view of one enabled provider.
///
/// Built per request from the persisted configuration; never cached.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Unique provider name
    pub name: String,
    /// Human readable name
    pub display_name: String,
    /// Decrypted API key
    pub api_key: SecretString,
    /// Custom base URL
    pub base_url: Option<String>,
    /// Enabled model ids; empty means no restriction
    pub models: Vec<String>,
    /// Lower is preferred
    pub priority: i32,
    /// Requests per minute; non-positive means unlimited
    pub rate_limit_rpm: i64,
    /// Tokens per minute; non-positive means unlimited
    pub rate_limit_tpm: i64,
    /// Protocol-family settings
    pub settings: Option<ProviderSettings>,
    /// Untyped vendor fields
    pub extra_config: serde_json::Map<String, serde_json::Value>,
}

impl ProviderDescriptor {
    /// Whether the provider accepts this model id
    #[must_use]
    pub fn supports_model(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }
}

/// One upstream vendor behind a uniform completion call
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name this adapter is bound to
    fn name(&self) -> &str;

    /// Wire protocol
    fn protocol(&self) -> Protocol;

    /// Largest output budget the vendor accepts
    fn max_output_tokens(&self) -> u32;

    /// Perform one completion call. Never retries internally.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

/// Builds adapters from descriptors
pub trait AdapterFactory: Send + Sync {
    /// Construct the adapter for a provider
    ///
    /// # Errors
    /// Returns a configuration error when the descriptor cannot be served
    fn build(&self, descriptor: &ProviderDescriptor) -> Result<Arc<dyn ProviderAdapter>, GatewayError>;
}
