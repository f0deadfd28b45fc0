//! Generation orchestrator.
//!
//! One inbound call moves through routing, cache lookup, rate check and the
//! upstream call, then is recorded exactly once whatever the outcome.

use gateway_core::{
    duration_millis, AdapterFactory, CompletionRequest, GatewayError, GenerateRequest,
    GenerateResponse, NewUsageLog,
};
use gateway_providers::ProviderRegistry;
use gateway_resilience::{Admission, ProviderLimits, RateLimiter, ResponseCache, RetryPolicy};
use gateway_routing::{ensure_routable, OverrideResolver};
use gateway_telemetry::{generate_span, CostCalculator, Metrics, UsageRecorder};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument, Span};

/// Collaborators of the orchestrator
pub struct OrchestratorParts {
    /// Provider configuration
    pub registry: ProviderRegistry,
    /// Routing overrides and defaults
    pub resolver: OverrideResolver,
    /// Adapter construction
    pub factory: Arc<dyn AdapterFactory>,
    /// Response cache
    pub cache: ResponseCache,
    /// Per-provider admission
    pub limiter: Arc<RateLimiter>,
    /// Upstream retry policy
    pub retry: RetryPolicy,
    /// Pricing
    pub costs: CostCalculator,
    /// Usage ledger writer
    pub recorder: UsageRecorder,
    /// Metrics
    pub metrics: Metrics,
}

/// Provider and model resolution reached before a failure
#[derive(Debug, Default)]
struct Resolved {
    provider: Option<String>,
    model: Option<String>,
}

/// Drives one generate request end to end
pub struct Orchestrator {
    registry: ProviderRegistry,
    resolver: OverrideResolver,
    factory: Arc<dyn AdapterFactory>,
    cache: ResponseCache,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    costs: CostCalculator,
    recorder: UsageRecorder,
    metrics: Metrics,
}

impl Orchestrator {
    /// Assemble from parts
    pub fn new(parts: OrchestratorParts) -> Self {
        Self {
            registry: parts.registry,
            resolver: parts.resolver,
            factory: parts.factory,
            cache: parts.cache,
            limiter: parts.limiter,
            retry: parts.retry,
            costs: parts.costs,
            recorder: parts.recorder,
            metrics: parts.metrics,
        }
    }

    /// Serve one request and record it.
    ///
    /// # Errors
    /// Returns the terminal error of the request; it has already been recorded.
    pub async fn generate(
        &self,
        request_id: &str,
        request: GenerateRequest,
    ) -> Result<GenerateResponse, GatewayError> {
        let span = generate_span!(request_id, request.user_id, request.service);

        async {
            let start = Instant::now();
            let mut resolved = Resolved::default();
            let result = self.execute(&request, &mut resolved, start).await;
            self.finish(request_id, &request, &resolved, &result, start).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &GenerateRequest,
        resolved: &mut Resolved,
        start: Instant,
    ) -> Result<GenerateResponse, GatewayError> {
        let params = request.validate()?;

        let decision = self.resolver.route(&request.user_id, &request.service).await?;
        resolved.provider = Some(decision.provider().to_string());
        resolved.model = Some(decision.model().to_string());
        Span::current().record("provider", decision.provider());
        Span::current().record("model", decision.model());

        let descriptor = self.registry.get(decision.provider()).await?;
        let decision = ensure_routable(decision, descriptor.as_ref())?;
        let descriptor = descriptor
            .ok_or_else(|| GatewayError::internal("routable provider has no descriptor"))?;
        let provider = descriptor.name.clone();
        let model = decision.model().to_string();

        let completion_request = CompletionRequest::from_generate(request, params, &model);
        let cache_key = self.cache.key(&provider, &completion_request);

        if self.cache.config().enabled {
            if let Some(mut hit) = self.cache.get(&cache_key).await {
                self.metrics.observe_cache(true);
                hit.cost_usd = 0.0;
                hit.latency_ms = duration_millis(start.elapsed());
                return Ok(hit);
            }
            self.metrics.observe_cache(false);
        }

        let limits = ProviderLimits::new(descriptor.rate_limit_rpm, descriptor.rate_limit_tpm);
        if let Admission::Denied { retry_after } = self.limiter.check(&provider, limits).await {
            self.metrics.observe_rate_limited(&provider);
            return Err(GatewayError::rate_limited(provider, retry_after));
        }

        let adapter = self.factory.build(&descriptor)?;
        let outcome = self
            .retry
            .execute(|attempt| {
                let adapter = Arc::clone(&adapter);
                let completion_request = &completion_request;
                let metrics = &self.metrics;
                let provider = provider.as_str();
                async move {
                    let result = adapter.complete(completion_request).await;
                    match &result {
                        Ok(_) => metrics.observe_attempt(provider, "success"),
                        Err(e) => {
                            debug!(attempt, kind = e.kind.as_str(), error = %e, "Upstream attempt failed");
                            metrics.observe_attempt(provider, e.kind.as_str());
                        }
                    }
                    result
                }
            })
            .await;

        let attempts = outcome.attempts();
        let completion = outcome
            .into_result()
            .map_err(|e| GatewayError::from_provider(e, attempts))?;

        if completion.usage_estimated {
            debug!(provider = %provider, "Vendor omitted usage, token counts are estimated");
        }

        let cost = self
            .costs
            .cost(&provider, &model, completion.input_tokens, completion.output_tokens);
        let mut response = GenerateResponse::from_completion(completion, &provider, &model, cost);

        self.cache.put(&cache_key, &response).await;
        self.limiter
            .record_tokens(&provider, limits, response.total_tokens())
            .await;
        self.metrics
            .observe_usage(&provider, response.input_tokens, response.output_tokens, cost);

        response.latency_ms = duration_millis(start.elapsed());
        Ok(response)
    }

    async fn finish(
        &self,
        request_id: &str,
        request: &GenerateRequest,
        resolved: &Resolved,
        result: &Result<GenerateResponse, GatewayError>,
        start: Instant,
    ) {
        let latency = start.elapsed();
        let mut entry = NewUsageLog {
            request_id: request_id.to_string(),
            user_id: request.user_id.clone(),
            service: request.service.clone(),
            task_type: request.task_type.clone(),
            provider: resolved.provider.clone().unwrap_or_default(),
            model: resolved.model.clone().unwrap_or_default(),
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            latency_ms: duration_millis(latency),
            cached: false,
            error_message: None,
            error_kind: None,
            prompt_preview: request.prompt.clone(),
        };

        let outcome = match result {
            Ok(response) => {
                entry.provider.clone_from(&response.provider);
                entry.model.clone_from(&response.model);
                entry.input_tokens = response.input_tokens;
                entry.output_tokens = response.output_tokens;
                entry.cost_usd = response.cost_usd;
                entry.latency_ms = response.latency_ms;
                entry.cached = response.cached;

                info!(
                    provider = %response.provider,
                    model = %response.model,
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    cost_usd = response.cost_usd,
                    cached = response.cached,
                    latency_ms = response.latency_ms,
                    "Generation completed"
                );
                if response.cached {
                    "cached"
                } else {
                    "success"
                }
            }
            Err(err) => {
                entry.error_message = Some(err.to_string());
                entry.error_kind = Some(err.kind().to_string());

                warn!(
                    kind = err.kind(),
                    status = err.status_code(),
                    provider = entry.provider.as_str(),
                    latency_ms = entry.latency_ms,
                    error = %err,
                    "Generation failed"
                );
                err.kind()
            }
        };

        let provider_label = if entry.provider.is_empty() {
            "none"
        } else {
            entry.provider.as_str()
        };
        self.metrics.observe_request(provider_label, outcome, latency);

        // The recorder logs and counts dropped rows itself.
        let _ = self.recorder.record(entry).await;
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("resolver", &self.resolver)
            .field("retry", &self.retry.config())
            .finish_non_exhaustive()
    }
}
