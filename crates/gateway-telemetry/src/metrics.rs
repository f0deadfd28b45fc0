//! Prometheus metrics.

use crate::error::TelemetryError;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Gateway metrics, registered in a private registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    /// Generate requests by provider and outcome
    pub requests_total: IntCounterVec,
    /// End-to-end request latency by provider
    pub request_duration_seconds: HistogramVec,
    /// Upstream attempts by provider and result
    pub upstream_attempts_total: IntCounterVec,
    /// Tokens by provider and direction
    pub tokens_total: IntCounterVec,
    /// Charged cost by provider
    pub cost_usd_total: CounterVec,
    /// Cache lookups by result
    pub cache_lookups_total: IntCounterVec,
    /// Rate limit denials by provider
    pub rate_limited_total: IntCounterVec,
    /// Usage rows that could not be written
    pub usage_write_failures_total: IntCounter,
}

impl Metrics {
    /// Create and register all metrics
    ///
    /// # Errors
    /// Returns error if a metric cannot be created or registered
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("llm_gateway_requests_total", "Generate requests handled"),
            &["provider", "outcome"],
        )?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "llm_gateway_request_duration_seconds",
                "End-to-end generate latency in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["provider"],
        )?;

        let upstream_attempts_total = IntCounterVec::new(
            Opts::new("llm_gateway_upstream_attempts_total", "Calls made to upstream vendors"),
            &["provider", "result"],
        )?;

        let tokens_total = IntCounterVec::new(
            Opts::new("llm_gateway_tokens_total", "Tokens consumed"),
            &["provider", "direction"],
        )?;

        let cost_usd_total = CounterVec::new(
            Opts::new("llm_gateway_cost_usd_total", "Charged cost in USD"),
            &["provider"],
        )?;

        let cache_lookups_total = IntCounterVec::new(
            Opts::new("llm_gateway_cache_lookups_total", "Response cache lookups"),
            &["result"],
        )?;

        let rate_limited_total = IntCounterVec::new(
            Opts::new("llm_gateway_rate_limited_total", "Requests denied by the rate limiter"),
            &["provider"],
        )?;

        let usage_write_failures_total = IntCounter::new(
            "llm_gateway_usage_write_failures_total",
            "Usage rows dropped after exhausting write attempts",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(upstream_attempts_total.clone()))?;
        registry.register(Box::new(tokens_total.clone()))?;
        registry.register(Box::new(cost_usd_total.clone()))?;
        registry.register(Box::new(cache_lookups_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        registry.register(Box::new(usage_write_failures_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration_seconds,
            upstream_attempts_total,
            tokens_total,
            cost_usd_total,
            cache_lookups_total,
            rate_limited_total,
            usage_write_failures_total,
        })
    }

    /// Record a finished generate request
    pub fn observe_request(&self, provider: &str, outcome: &str, latency: Duration) {
        self.requests_total.with_label_values(&[provider, outcome]).inc();
        self.request_duration_seconds
            .with_label_values(&[provider])
            .observe(latency.as_secs_f64());
    }

    /// Record token usage and cost of a successful upstream call
    pub fn observe_usage(&self, provider: &str, input_tokens: u32, output_tokens: u32, cost_usd: f64) {
        self.tokens_total
            .with_label_values(&[provider, "input"])
            .inc_by(u64::from(input_tokens));
        self.tokens_total
            .with_label_values(&[provider, "output"])
            .inc_by(u64::from(output_tokens));
        if cost_usd > 0.0 {
            self.cost_usd_total.with_label_values(&[provider]).inc_by(cost_usd);
        }
    }

    /// Record one upstream attempt
    pub fn observe_attempt(&self, provider: &str, result: &str) {
        self.upstream_attempts_total
            .with_label_values(&[provider, result])
            .inc();
    }

    /// Record a cache lookup
    pub fn observe_cache(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    /// Record a rate limit denial
    pub fn observe_rate_limited(&self, provider: &str) {
        self.rate_limited_total.with_label_values(&[provider]).inc();
    }

    /// Encode every metric in the text exposition format
    ///
    /// # Errors
    /// Returns error if encoding fails
    pub fn gather(&self) -> Result<String, TelemetryError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_sample(text: &str, name: &str, labels: &[&str], value: &str) -> bool {
        text.lines().any(|line| {
            line.starts_with(name)
                && line[name.len()..].starts_with(['{', ' '])
                && labels.iter().all(|l| line.contains(l))
                && line.ends_with(&format!(" {value}"))
        })
    }

    #[test]
    fn test_gather_exposes_recorded_values() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_request("claude", "success", Duration::from_millis(120));
        metrics.observe_usage("claude", 10, 5, 0.0001);
        metrics.observe_cache(true);
        metrics.observe_rate_limited("openai");
        metrics.usage_write_failures_total.inc();

        let text = metrics.gather().unwrap();
        assert!(has_sample(&text, "llm_gateway_requests_total", &["provider=\"claude\"", "outcome=\"success\""], "1"));
        assert!(has_sample(&text, "llm_gateway_tokens_total", &["direction=\"input\""], "10"));
        assert!(has_sample(&text, "llm_gateway_cache_lookups_total", &["result=\"hit\""], "1"));
        assert!(has_sample(&text, "llm_gateway_rate_limited_total", &["provider=\"openai\""], "1"));
        assert!(has_sample(&text, "llm_gateway_usage_write_failures_total", &[], "1"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.observe_cache(false);
        assert!(!b.gather().unwrap().contains("llm_gateway_cache_lookups_total{"));
    }
}
