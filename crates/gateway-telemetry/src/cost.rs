//! Cost calculation from a static pricing table.
//!
//! Lookup falls back in three tiers: the exact (provider, model) entry, then
//! the first entry registered for the provider, then a global default. Order
//! of registration matters for the second tier.

use serde::{Deserialize, Serialize};

/// Price of one model in USD per million tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Provider name
    pub provider: String,
    /// Model id
    pub model: String,
    /// Input price per million tokens
    pub input_per_million: f64,
    /// Output price per million tokens
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Create new model pricing
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        input_per_million: f64,
        output_per_million: f64,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            input_per_million,
            output_per_million,
        }
    }

    /// Calculate cost for given token counts
    #[must_use]
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (f64::from(input_tokens) * self.input_per_million
            + f64::from(output_tokens) * self.output_per_million)
            / 1_000_000.0
    }
}

/// Which tier produced a price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceTier {
    /// Exact provider and model match
    Exact,
    /// First entry of the provider
    ProviderFallback,
    /// Global default
    Default,
}

/// Price point used when the provider has no entry at all
pub const DEFAULT_INPUT_PER_MILLION: f64 = 1.0;
/// Price point used when the provider has no entry at all
pub const DEFAULT_OUTPUT_PER_MILLION: f64 = 3.0;

/// Built-in table; the first row of each provider is its fallback tier.
const BUILTIN_PRICING: &[(&str, &str, f64, f64)] = &[
    ("claude", "claude-sonnet-4-5-20250929", 3.0, 15.0),
    ("claude", "claude-haiku-4-5-20251001", 1.0, 5.0),
    ("claude", "claude-opus-4-1-20250805", 15.0, 75.0),
    ("openai", "gpt-4o-mini", 0.15, 0.60),
    ("openai", "gpt-4o", 2.50, 10.0),
    ("openai", "gpt-4.1", 2.0, 8.0),
    ("deepseek", "deepseek-chat", 0.27, 1.10),
    ("deepseek", "deepseek-reasoner", 0.55, 2.19),
    ("groq", "llama-3.3-70b-versatile", 0.59, 0.79),
    ("groq", "llama-3.1-8b-instant", 0.05, 0.08),
    ("mistral", "mistral-small-latest", 0.20, 0.60),
    ("mistral", "mistral-large-latest", 2.0, 6.0),
    ("xai", "grok-3-mini", 0.30, 0.50),
    ("xai", "grok-3", 3.0, 15.0),
    ("together", "meta-llama/Llama-3.3-70B-Instruct-Turbo", 0.88, 0.88),
];

/// Deterministic (provider, model, tokens) to USD conversion
#[derive(Debug, Clone)]
pub struct CostCalculator {
    entries: Vec<ModelPricing>,
    default: ModelPricing,
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new(
            BUILTIN_PRICING
                .iter()
                .map(|(p, m, i, o)| ModelPricing::new(*p, *m, *i, *o))
                .collect(),
        )
    }
}

impl CostCalculator {
    /// Calculator over an explicit table
    #[must_use]
    pub fn new(entries: Vec<ModelPricing>) -> Self {
        Self {
            entries,
            default: ModelPricing::new("*", "*", DEFAULT_INPUT_PER_MILLION, DEFAULT_OUTPUT_PER_MILLION),
        }
    }

    /// Replace matching entries in place and append new ones
    #[must_use]
    pub fn with_entries(mut self, entries: impl IntoIterator<Item = ModelPricing>) -> Self {
        for entry in entries {
            match self
                .entries
                .iter_mut()
                .find(|e| e.provider == entry.provider && e.model == entry.model)
            {
                Some(existing) => *existing = entry,
                None => self.entries.push(entry),
            }
        }
        self
    }

    /// Set the global default price point
    #[must_use]
    pub fn with_default(mut self, input_per_million: f64, output_per_million: f64) -> Self {
        self.default = ModelPricing::new("*", "*", input_per_million, output_per_million);
        self
    }

    /// Pricing table in lookup order
    #[must_use]
    pub fn entries(&self) -> &[ModelPricing] {
        &self.entries
    }

    /// Resolve the price applying to a provider and model
    #[must_use]
    pub fn pricing(&self, provider: &str, model: &str) -> (&ModelPricing, PriceTier) {
        if let Some(exact) = self
            .entries
            .iter()
            .find(|e| e.provider == provider && e.model == model)
        {
            return (exact, PriceTier::Exact);
        }
        if let Some(first) = self.entries.iter().find(|e| e.provider == provider) {
            return (first, PriceTier::ProviderFallback);
        }
        (&self.default, PriceTier::Default)
    }

    /// Cost in USD
    #[must_use]
    pub fn cost(&self, provider: &str, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        if input_tokens == 0 && output_tokens == 0 {
            return 0.0;
        }
        self.pricing(provider, model).0.calculate_cost(input_tokens, output_tokens)
    }
}
