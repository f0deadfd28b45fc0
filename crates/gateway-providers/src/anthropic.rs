//! Anthropic Messages API adapter.
//!
//! Differences from the OpenAI protocol:
//! - endpoint is `{base}/v1/messages`
//! - key sent in `x-api-key`, plus a mandatory `anthropic-version` header
//! - system prompt is a top-level field, not a message
//! - no native JSON mode; an instruction is appended to the system prompt

use crate::http::{decode_body, join_url, send_error, status_error};
use crate::profiles::DEFAULT_ANTHROPIC_VERSION;
use async_trait::async_trait;
use gateway_core::{
    estimate_tokens, Completion, CompletionRequest, Protocol, ProviderAdapter, ProviderError,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Instruction appended to the system prompt in JSON mode
pub const JSON_MODE_INSTRUCTION: &str =
    "Respond with a single valid JSON object and no other text.";

/// Anthropic adapter configuration
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// Provider name
    pub provider: String,
    /// Base URL without the version segment
    pub base_url: String,
    /// API key
    pub api_key: SecretString,
    /// `anthropic-version` header
    pub api_version: String,
    /// Output ceiling
    pub max_output_tokens: u32,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl AnthropicConfig {
    /// Create a new configuration against the public API
    #[must_use]
    pub fn new(provider: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            base_url: "https://api.anthropic.com".to_string(),
            api_key: SecretString::new(api_key.into()),
            api_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
            max_output_tokens: 64_000,
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the API version header
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Set the output ceiling
    #[must_use]
    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = max;
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Messages endpoint
    #[must_use]
    pub fn messages_url(&self) -> String {
        join_url(&self.base_url, "v1/messages")
    }
}

/// Adapter for the Anthropic Messages API
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicAdapter {
    /// Create an adapter sharing an existing HTTP client
    #[must_use]
    pub fn new(config: AnthropicConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Adapter configuration
    #[must_use]
    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    fn transform_request(&self, request: &CompletionRequest) -> MessagesRequest {
        let system = match (&request.system, request.json_mode) {
            (Some(system), true) => Some(format!("{system}\n\n{JSON_MODE_INSTRUCTION}")),
            (None, true) => Some(JSON_MODE_INSTRUCTION.to_string()),
            (system, false) => system.clone(),
        };

        let requested = request.max_tokens.value();
        let max_tokens = request.max_tokens.clamp_to(self.config.max_output_tokens).value();
        if max_tokens < requested {
            warn!(
                provider = %self.config.provider,
                requested,
                ceiling = max_tokens,
                "Clamping max_tokens to provider ceiling"
            );
        }

        MessagesRequest {
            model: request.model.clone(),
            max_tokens,
            temperature: request.temperature.value().min(1.0),
            system,
            messages: vec![Message {
                role: "user",
                content: request.prompt.clone(),
            }],
        }
    }

    fn transform_response(
        &self,
        request: &CompletionRequest,
        response: MessagesResponse,
        latency: Duration,
    ) -> Result<Completion, ProviderError> {
        let content: String = response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if content.is_empty() && response.content.is_empty() {
            return Err(ProviderError::malformed(
                &self.config.provider,
                "response contained no content blocks",
            ));
        }

        let (input_tokens, output_tokens, usage_estimated) = match response.usage {
            Some(usage) => (usage.input_tokens, usage.output_tokens, false),
            None => {
                let input = estimate_tokens(&request.prompt)
                    + request.system.as_deref().map_or(0, estimate_tokens);
                (input, estimate_tokens(&content), true)
            }
        };

        Ok(Completion {
            content,
            input_tokens,
            output_tokens,
            latency,
            usage_estimated,
        })
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.config.provider
    }

    fn protocol(&self) -> Protocol {
        Protocol::Anthropic
    }

    fn max_output_tokens(&self) -> u32 {
        self.config.max_output_tokens
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let provider = self.config.provider.as_str();
        let url = self.config.messages_url();
        let body = self.transform_request(request);

        debug!(provider = %provider, model = %request.model, "Sending Anthropic messages request");

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", &self.config.api_version)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(provider, &e, self.config.timeout))?;

        if !response.status().is_success() {
            return Err(status_error(provider, response).await);
        }

        let parsed: MessagesResponse = decode_body(provider, response, self.config.timeout).await?;
        self.transform_response(request, parsed, started.elapsed())
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{MaxTokens, Temperature};

    fn adapter() -> AnthropicAdapter {
        AnthropicAdapter::new(
            AnthropicConfig::new("claude", "sk-ant").with_max_output_tokens(8192),
            Client::new(),
        )
    }

    #[test]
    fn test_config_defaults() {
        let config = AnthropicConfig::new("claude", "k");
        assert_eq!(config.api_version, DEFAULT_ANTHROPIC_VERSION);
        assert_eq!(config.messages_url(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn test_transform_request_system_and_json_mode() {
        let request = CompletionRequest::new("claude-haiku-4-5", "list colors")
            .with_system("You are helpful.")
            .with_json_mode(true)
            .with_max_tokens(MaxTokens::new(20_000).unwrap());
        let body = serde_json::to_value(adapter().transform_request(&request)).unwrap();

        assert_eq!(body["max_tokens"], 8192);
        assert_eq!(body["messages"][0]["role"], "user");
        let system = body["system"].as_str().unwrap();
        assert!(system.starts_with("You are helpful."));
        assert!(system.ends_with(JSON_MODE_INSTRUCTION));
    }

    #[test]
    fn test_temperature_capped_at_vendor_max() {
        let request = CompletionRequest::new("m", "p").with_temperature(Temperature::new(1.8).unwrap());
        let body = adapter().transform_request(&request);
        assert!((body.temperature - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_transform_response_joins_text_blocks() {
        let request = CompletionRequest::new("m", "p");
        let response: MessagesResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "Hello"},
                {"type": "text", "text": ", world"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 4}
        }))
        .unwrap();
        let completion = adapter()
            .transform_response(&request, response, Duration::from_millis(1))
            .unwrap();
        assert_eq!(completion.content, "Hello, world");
        assert_eq!(completion.input_tokens, 12);
        assert!(!completion.usage_estimated);
    }

    #[test]
    fn test_empty_content_is_malformed() {
        let request = CompletionRequest::new("m", "p");
        let response: MessagesResponse =
            serde_json::from_value(serde_json::json!({"content": []})).unwrap();
        assert!(adapter()
            .transform_response(&request, response, Duration::ZERO)
            .is_err());
    }
}
