//! Builds adapters from provider descriptors.

use crate::anthropic::{AnthropicAdapter, AnthropicConfig};
use crate::openai_compat::{OpenAiCompatAdapter, OpenAiCompatConfig};
use crate::profiles::{resolve_endpoint, DEFAULT_ANTHROPIC_VERSION};
use gateway_core::{AdapterFactory, GatewayError, Protocol, ProviderAdapter, ProviderDescriptor};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Adapter factory backed by one pooled HTTP client.
///
/// Adapters are cheap wrappers around the shared client, so building one per
/// request keeps them in step with the registry.
#[derive(Debug, Clone)]
pub struct HttpAdapterFactory {
    client: Client,
    timeout: Duration,
}

impl HttpAdapterFactory {
    /// Create a factory with its own client
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(32)
            .user_agent(concat!("llm-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    /// Create a factory around an existing client
    #[must_use]
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Per-attempt timeout handed to adapters
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl AdapterFactory for HttpAdapterFactory {
    fn build(&self, descriptor: &ProviderDescriptor) -> Result<Arc<dyn ProviderAdapter>, GatewayError> {
        let endpoint = resolve_endpoint(descriptor)
            .map_err(|e| GatewayError::configuration(e.to_string()))?;

        let adapter: Arc<dyn ProviderAdapter> = match endpoint.protocol {
            Protocol::Anthropic => {
                let config = AnthropicConfig {
                    provider: descriptor.name.clone(),
                    base_url: endpoint.base_url,
                    api_key: descriptor.api_key.clone(),
                    api_version: endpoint
                        .api_version
                        .unwrap_or_else(|| DEFAULT_ANTHROPIC_VERSION.to_string()),
                    max_output_tokens: endpoint.max_output_tokens,
                    timeout: self.timeout,
                };
                Arc::new(AnthropicAdapter::new(config, self.client.clone()))
            }
            Protocol::OpenAiCompatible => {
                let config = OpenAiCompatConfig {
                    provider: descriptor.name.clone(),
                    base_url: endpoint.base_url,
                    api_key: descriptor.api_key.clone(),
                    auth: endpoint.auth,
                    organization: endpoint.organization,
                    max_output_tokens: endpoint.max_output_tokens,
                    timeout: self.timeout,
                };
                Arc::new(OpenAiCompatAdapter::new(config, self.client.clone()))
            }
        };

        Ok(adapter)
    }
}
