//! Request types for the gateway.
//!
//! [`GenerateRequest`] is what downstream services send. [`CompletionRequest`] is
//! the provider-neutral shape handed to an adapter once routing has picked a
//! provider and model.

use crate::error::GatewayError;
use crate::types::{MaxTokens, Temperature};
use serde::{Deserialize, Serialize};

/// Longest prompt accepted, in characters
pub const MAX_PROMPT_CHARS: usize = 400_000;

fn default_task_type() -> String {
    "general".to_string()
}

fn default_max_tokens() -> u32 {
    MaxTokens::default().value()
}

fn default_temperature() -> f32 {
    Temperature::default().value()
}

/// Inbound generation call from a downstream service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateRequest {
    /// End user the call is made on behalf of
    pub user_id: String,

    /// Calling service name
    pub service: String,

    /// Free-form task label used for analytics
    #[serde(default = "default_task_type")]
    pub task_type: String,

    /// User prompt
    pub prompt: String,

    /// Optional system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Ask the model for a JSON object
    #[serde(default)]
    pub json_mode: bool,
}

/// Sampling parameters after validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    /// Output budget
    pub max_tokens: MaxTokens,
    /// Temperature
    pub temperature: Temperature,
    /// JSON mode flag
    pub json_mode: bool,
}

impl GenerateRequest {
    /// Create a new builder for `GenerateRequest`
    #[must_use]
    pub fn builder() -> GenerateRequestBuilder {
        GenerateRequestBuilder::default()
    }

    /// Validate the entire request
    ///
    /// # Errors
    /// Returns error if any field is invalid
    pub fn validate(&self) -> Result<SamplingParams, GatewayError> {
        require_non_blank(&self.user_id, "user_id")?;
        require_non_blank(&self.service, "service")?;

        if self.prompt.trim().is_empty() {
            return Err(GatewayError::validation(
                "prompt cannot be empty",
                Some("prompt".to_string()),
                "empty_prompt",
            ));
        }
        if self.prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(GatewayError::validation(
                format!("prompt exceeds {MAX_PROMPT_CHARS} characters"),
                Some("prompt".to_string()),
                "prompt_too_long",
            ));
        }

        Ok(SamplingParams {
            max_tokens: MaxTokens::new(self.max_tokens)?,
            temperature: Temperature::new(self.temperature)?,
            json_mode: self.json_mode,
        })
    }

    /// System prompt when it carries any text
    #[must_use]
    pub fn effective_system(&self) -> Option<&str> {
        self.system.as_deref().filter(|s| !s.trim().is_empty())
    }
}

fn require_non_blank(value: &str, field: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::validation(
            format!("{field} cannot be empty"),
            Some(field.to_string()),
            format!("empty_{field}"),
        ));
    }
    Ok(())
}

/// Unify CRLF/CR line endings to LF and trim surrounding whitespace
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// Builder for `GenerateRequest`
#[derive(Debug, Default)]
pub struct GenerateRequestBuilder {
    user_id: Option<String>,
    service: Option<String>,
    task_type: Option<String>,
    prompt: Option<String>,
    system: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    json_mode: bool,
}

impl GenerateRequestBuilder {
    /// Set the user id
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the calling service
    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Set the task type
    #[must_use]
    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    /// Set the prompt
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Set the system prompt
    #[must_use]
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Enable JSON mode
    #[must_use]
    pub fn json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    /// Build the request. Missing fields are left empty and rejected by `validate`.
    #[must_use]
    pub fn build(self) -> GenerateRequest {
        GenerateRequest {
            user_id: self.user_id.unwrap_or_default(),
            service: self.service.unwrap_or_default(),
            task_type: self.task_type.unwrap_or_else(default_task_type),
            prompt: self.prompt.unwrap_or_default(),
            system: self.system,
            max_tokens: self.max_tokens.unwrap_or_else(default_max_tokens),
            temperature: self.temperature.unwrap_or_else(default_temperature),
            json_mode: self.json_mode,
        }
    }
}

/// Provider-neutral completion request handed to an adapter
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Vendor model id
    pub model: String,
    /// Normalized user prompt
    pub prompt: String,
    /// Normalized system prompt
    pub system: Option<String>,
    /// Output budget
    pub max_tokens: MaxTokens,
    /// Temperature
    pub temperature: Temperature,
    /// JSON mode flag
    pub json_mode: bool,
}

impl CompletionRequest {
    /// Create a request with default sampling parameters
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            max_tokens: MaxTokens::default(),
            temperature: Temperature::default(),
            json_mode: false,
        }
    }

    /// Build from a validated inbound request and a resolved model.
    ///
    /// Prompt text is forwarded as sent; normalization only applies to the
    /// cache fingerprint.
    #[must_use]
    pub fn from_generate(request: &GenerateRequest, params: SamplingParams, model: &str) -> Self {
        Self {
            model: model.to_string(),
            prompt: request.prompt.clone(),
            system: request.effective_system().map(str::to_string),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            json_mode: params.json_mode,
        }
    }

    /// Set the system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the output budget
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: MaxTokens) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: Temperature) -> Self {
        self.temperature = temperature;
        self
    }

    /// Enable JSON mode
    #[must_use]
    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}
