//! Built-in vendor profiles.
//!
//! A profile supplies the defaults for a provider name: protocol, base URL,
//! default model, auth header style and output ceiling. Stored settings and a
//! custom base URL override the profile field by field.

use gateway_core::{AuthScheme, Protocol, ProviderDescriptor, ProviderSettings};

/// Anthropic API version sent when none is configured
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Output ceiling used for unknown OpenAI-compatible vendors
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8_192;

/// Static defaults for a known vendor
#[derive(Debug, Clone, Copy)]
pub struct VendorProfile {
    /// Provider names that select this profile
    pub names: &'static [&'static str],
    /// Wire protocol
    pub protocol: Protocol,
    /// Base URL
    pub base_url: &'static str,
    /// Model used when a request names none
    pub default_model: &'static str,
    /// Largest output budget the vendor accepts
    pub max_output_tokens: u32,
    /// Whether the key is sent as `x-api-key` instead of a bearer token
    pub x_api_key: bool,
}

/// Known vendors
pub const PROFILES: &[VendorProfile] = &[
    VendorProfile {
        names: &["claude", "anthropic"],
        protocol: Protocol::Anthropic,
        base_url: "https://api.anthropic.com",
        default_model: "claude-sonnet-4-5-20250929",
        max_output_tokens: 64_000,
        x_api_key: true,
    },
    VendorProfile {
        names: &["openai"],
        protocol: Protocol::OpenAiCompatible,
        base_url: "https://api.openai.com/v1",
        default_model: "gpt-4o-mini",
        max_output_tokens: 16_384,
        x_api_key: false,
    },
    VendorProfile {
        names: &["deepseek"],
        protocol: Protocol::OpenAiCompatible,
        base_url: "https://api.deepseek.com/v1",
        default_model: "deepseek-chat",
        max_output_tokens: 8_192,
        x_api_key: false,
    },
    VendorProfile {
        names: &["groq"],
        protocol: Protocol::OpenAiCompatible,
        base_url: "https://api.groq.com/openai/v1",
        default_model: "llama-3.3-70b-versatile",
        max_output_tokens: 32_768,
        x_api_key: false,
    },
    VendorProfile {
        names: &["mistral"],
        protocol: Protocol::OpenAiCompatible,
        base_url: "https://api.mistral.ai/v1",
        default_model: "mistral-small-latest",
        max_output_tokens: 32_768,
        x_api_key: false,
    },
    VendorProfile {
        names: &["xai", "grok"],
        protocol: Protocol::OpenAiCompatible,
        base_url: "https://api.x.ai/v1",
        default_model: "grok-3-mini",
        max_output_tokens: 32_768,
        x_api_key: false,
    },
    VendorProfile {
        names: &["together"],
        protocol: Protocol::OpenAiCompatible,
        base_url: "https://api.together.xyz/v1",
        default_model: "meta-llama/Llama-3.3-70B-Instruct-Turbo",
        max_output_tokens: 8_192,
        x_api_key: false,
    },
];

/// Look up a profile by provider name
#[must_use]
pub fn profile_for(name: &str) -> Option<&'static VendorProfile> {
    let name = name.to_ascii_lowercase();
    PROFILES.iter().find(|p| p.names.contains(&name.as_str()))
}

/// Fully resolved connection parameters for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Wire protocol
    pub protocol: Protocol,
    /// Base URL
    pub base_url: String,
    /// Default model
    pub default_model: Option<String>,
    /// Auth header style
    pub auth: AuthScheme,
    /// Output ceiling
    pub max_output_tokens: u32,
    /// `anthropic-version` header (Anthropic only)
    pub api_version: Option<String>,
    /// `OpenAI-Organization` header (OpenAI-compatible only)
    pub organization: Option<String>,
}

/// Why a descriptor cannot be turned into an endpoint
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("provider '{0}' has no known profile and no base_url")]
pub struct UnknownVendor(pub String);

/// Merge a descriptor with its profile
pub fn resolve_endpoint(descriptor: &ProviderDescriptor) -> Result<Endpoint, UnknownVendor> {
    let profile = profile_for(&descriptor.name);

    let protocol = match (&descriptor.settings, profile) {
        (Some(ProviderSettings::Anthropic { .. }), _) => Protocol::Anthropic,
        (Some(ProviderSettings::OpenAiCompatible { .. }), _) => Protocol::OpenAiCompatible,
        (None, Some(p)) => p.protocol,
        (None, None) => Protocol::OpenAiCompatible,
    };

    let base_url = descriptor
        .base_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .or_else(|| profile.map(|p| p.base_url.to_string()))
        .ok_or_else(|| UnknownVendor(descriptor.name.clone()))?;

    let profile_ceiling = profile.map_or(DEFAULT_MAX_OUTPUT_TOKENS, |p| p.max_output_tokens);
    let profile_auth = match (protocol, profile) {
        (Protocol::Anthropic, _) => AuthScheme::XApiKey,
        (_, Some(p)) if p.x_api_key => AuthScheme::XApiKey,
        _ => AuthScheme::Bearer,
    };

    let mut endpoint = Endpoint {
        protocol,
        base_url,
        default_model: profile.map(|p| p.default_model.to_string()),
        auth: profile_auth,
        max_output_tokens: profile_ceiling,
        api_version: None,
        organization: None,
    };

    match &descriptor.settings {
        Some(ProviderSettings::Anthropic { api_version }) => {
            endpoint.api_version = api_version.clone();
        }
        Some(ProviderSettings::OpenAiCompatible {
            default_model,
            auth,
            organization,
            max_output_tokens,
        }) => {
            if let Some(model) = default_model {
                endpoint.default_model = Some(model.clone());
            }
            if let Some(auth) = auth {
                endpoint.auth = auth.clone();
            }
            if let Some(ceiling) = max_output_tokens {
                endpoint.max_output_tokens = *ceiling;
            }
            endpoint.organization = organization.clone();
        }
        None => {}
    }

    if endpoint.protocol == Protocol::Anthropic && endpoint.api_version.is_none() {
        endpoint.api_version = Some(DEFAULT_ANTHROPIC_VERSION.to_string());
    }
    if endpoint.default_model.is_none() {
        endpoint.default_model = descriptor.models.first().cloned();
    }

    Ok(endpoint)
}
