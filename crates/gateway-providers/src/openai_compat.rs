//! OpenAI Chat Completions adapter.
//!
//! One implementation serves every vendor that speaks the OpenAI protocol
//! (OpenAI, DeepSeek, Groq, Mistral, xAI, Together and self-hosted servers such
//! as vLLM). Vendors differ only in base URL, default model, auth header and
//! output ceiling.

use crate::http::{decode_body, join_url, send_error, status_error};
use crate::profiles::DEFAULT_MAX_OUTPUT_TOKENS;
use async_trait::async_trait;
use gateway_core::{
    estimate_tokens, AuthScheme, Completion, CompletionRequest, Protocol, ProviderAdapter,
    ProviderError,
};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// OpenAI-compatible adapter configuration
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Provider name
    pub provider: String,
    /// Base URL including the version segment (e.g. `https://api.openai.com/v1`)
    pub base_url: String,
    /// API key
    pub api_key: SecretString,
    /// Auth header style
    pub auth: AuthScheme,
    /// `OpenAI-Organization` header
    pub organization: Option<String>,
    /// Output ceiling
    pub max_output_tokens: u32,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl OpenAiCompatConfig {
    /// Create a new configuration with bearer auth
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            base_url: base_url.into(),
            api_key: SecretString::new(api_key.into()),
            auth: AuthScheme::Bearer,
            organization: None,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the auth scheme
    #[must_use]
    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }

    /// Set the organization header
    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
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

    /// Chat completions endpoint
    #[must_use]
    pub fn completions_url(&self) -> String {
        join_url(&self.base_url, "chat/completions")
    }
}

/// Adapter for OpenAI-protocol vendors
#[derive(Debug, Clone)]
pub struct OpenAiCompatAdapter {
    config: OpenAiCompatConfig,
    client: Client,
}

impl OpenAiCompatAdapter {
    /// Create an adapter sharing an existing HTTP client
    #[must_use]
    pub fn new(config: OpenAiCompatConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Adapter configuration
    #[must_use]
    pub fn config(&self) -> &OpenAiCompatConfig {
        &self.config
    }

    /// Transform a completion request to the wire format
    fn transform_request(&self, request: &CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.clone(),
        });

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

        ChatRequest {
            model: request.model.clone(),
            messages,
            max_tokens,
            temperature: request.temperature.value(),
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        }
    }

    /// Transform a wire response into a completion
    fn transform_response(
        &self,
        request: &CompletionRequest,
        response: ChatResponse,
        latency: Duration,
    ) -> Result<Completion, ProviderError> {
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ProviderError::malformed(&self.config.provider, "response contained no choices")
            })?;

        let (input_tokens, output_tokens, usage_estimated) = match response.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens, false),
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

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let key = self.config.api_key.expose_secret();
        let builder = match &self.config.auth {
            AuthScheme::Bearer => builder.bearer_auth(key),
            AuthScheme::XApiKey => builder.header("x-api-key", key),
            AuthScheme::Header { name } => builder.header(name.as_str(), key),
        };
        match &self.config.organization {
            Some(org) => builder.header("OpenAI-Organization", org),
            None => builder,
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn name(&self) -> &str {
        &self.config.provider
    }

    fn protocol(&self) -> Protocol {
        Protocol::OpenAiCompatible
    }

    fn max_output_tokens(&self) -> u32 {
        self.config.max_output_tokens
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let provider = self.config.provider.as_str();
        let url = self.config.completions_url();
        let body = self.transform_request(request);

        debug!(provider = %provider, model = %request.model, url = %url, "Sending chat completion");

        let started = Instant::now();
        let response = self
            .authorize(self.client.post(&url))
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(provider, &e, self.config.timeout))?;

        if !response.status().is_success() {
            return Err(status_error(provider, response).await);
        }

        let parsed: ChatResponse = decode_body(provider, response, self.config.timeout).await?;
        self.transform_response(request, parsed, started.elapsed())
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::MaxTokens;

    fn adapter() -> OpenAiCompatAdapter {
        let config = OpenAiCompatConfig::new("deepseek", "https://api.deepseek.com/v1", "sk")
            .with_max_output_tokens(8192);
        OpenAiCompatAdapter::new(config, Client::new())
    }

    #[test]
    fn test_config_builder() {
        let config = OpenAiCompatConfig::new("groq", "https://api.groq.com/openai/v1/", "k")
            .with_timeout(Duration::from_secs(5))
            .with_organization("org");
        assert_eq!(config.completions_url(), "https://api.groq.com/openai/v1/chat/completions");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.organization.as_deref(), Some("org"));
    }

    #[test]
    fn test_transform_request() {
        let request = CompletionRequest::new("deepseek-chat", "hello")
            .with_system("be terse")
            .with_max_tokens(MaxTokens::new(50_000).unwrap())
            .with_json_mode(true);
        let body = serde_json::to_value(adapter().transform_request(&request)).unwrap();

        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["max_tokens"], 8192);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_transform_request_without_json_mode() {
        let request = CompletionRequest::new("deepseek-chat", "hello");
        let body = serde_json::to_value(adapter().transform_request(&request)).unwrap();
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_transform_response_estimates_missing_usage() {
        let request = CompletionRequest::new("m", "abcdefgh");
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "abcd"}}]
        }))
        .unwrap();
        let completion = adapter()
            .transform_response(&request, response, Duration::from_millis(5))
            .unwrap();
        assert_eq!(completion.input_tokens, 2);
        assert_eq!(completion.output_tokens, 1);
        assert!(completion.usage_estimated);
    }

    #[test]
    fn test_transform_response_without_choices_is_malformed() {
        let request = CompletionRequest::new("m", "p");
        let response: ChatResponse = serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        let err = adapter()
            .transform_response(&request, response, Duration::ZERO)
            .unwrap_err();
        assert_eq!(err.kind, gateway_core::ProviderErrorKind::MalformedResponse);
    }
}
