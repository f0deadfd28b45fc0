//! # Gateway Providers
//!
//! Upstream LLM vendors for the gateway.
//!
//! Two wire protocols are implemented:
//! - Anthropic Messages (`claude`)
//! - OpenAI Chat Completions, shared by OpenAI, DeepSeek, Groq, Mistral, xAI,
//!   Together and self-hosted compatible servers
//!
//! The [`ProviderRegistry`] reads provider configuration from the store on every
//! call and decrypts API keys with [`ApiKeyCipher`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anthropic;
pub mod crypto;
pub mod factory;
mod http;
pub mod openai_compat;
pub mod profiles;
pub mod registry;

// Re-export main types
pub use anthropic::{AnthropicAdapter, AnthropicConfig};
pub use crypto::{constant_time_eq, ApiKeyCipher, CipherError};
pub use factory::HttpAdapterFactory;
pub use openai_compat::{OpenAiCompatAdapter, OpenAiCompatConfig};
pub use profiles::{profile_for, resolve_endpoint, Endpoint, VendorProfile};
pub use registry::{ProviderRegistry, ProviderStatus, ProviderUpdate};
