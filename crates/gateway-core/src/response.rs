//! Response types for the gateway.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of one successful adapter call
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Generated text
    pub content: String,
    /// Prompt tokens, from the vendor or estimated
    pub input_tokens: u32,
    /// Completion tokens, from the vendor or estimated
    pub output_tokens: u32,
    /// Wall time of the HTTP exchange
    pub latency: Duration,
    /// True when the vendor omitted usage and counts were estimated
    pub usage_estimated: bool,
}

/// Normalized response returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Generated text
    pub content: String,
    /// Provider that produced the content
    pub provider: String,
    /// Model that produced the content
    pub model: String,
    /// Prompt tokens
    pub input_tokens: u32,
    /// Completion tokens
    pub output_tokens: u32,
    /// Cost charged for this call in USD
    pub cost_usd: f64,
    /// Served from the response cache
    pub cached: bool,
    /// End-to-end latency in milliseconds
    pub latency_ms: u64,
}

impl GenerateResponse {
    /// Build from a completion and the routing decision that produced it
    #[must_use]
    pub fn from_completion(
        completion: Completion,
        provider: impl Into<String>,
        model: impl Into<String>,
        cost_usd: f64,
    ) -> Self {
        Self {
            content: completion.content,
            provider: provider.into(),
            model: model.into(),
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            cost_usd,
            cached: false,
            latency_ms: duration_millis(completion.latency),
        }
    }

    /// Total tokens
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        u64::from(self.input_tokens) + u64::from(self.output_tokens)
    }
}

/// Rough token estimate used when a vendor omits usage: ~4 characters per token.
#[must_use]
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    if chars == 0 {
        return 0;
    }
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

/// Milliseconds in a duration, saturating at `u64::MAX`
#[must_use]
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
