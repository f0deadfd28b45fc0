//! Per-provider fixed-window rate limiting.
//!
//! Counters live in a [`CounterStore`] so that several gateway instances can
//! share one budget through Redis. Each provider has a request counter and,
//! when a token budget is configured, a token counter for the same window.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::Script;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Counter backend failure
#[derive(Debug, Error)]
pub enum CounterError {
    /// Backend unreachable or returned an error
    #[error("Counter backend unavailable: {0}")]
    Unavailable(String),
}

/// Counter value and time until its window closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Value after the operation
    pub count: i64,
    /// Time until the counter resets
    pub resets_in: Duration,
}

/// Atomic increment-and-expire counters
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Add `by` to the counter, starting a new window of `window` if none is open
    async fn increment(&self, key: &str, by: i64, window: Duration) -> Result<WindowCount, CounterError>;

    /// Read the counter without changing it; absent counters read as zero
    async fn current(&self, key: &str) -> Result<WindowCount, CounterError>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

#[derive(Debug)]
struct Window {
    count: i64,
    expires_at: Instant,
}

/// In-process counters for single-instance deployments
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryCounterStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, by: i64, window: Duration) -> Result<WindowCount, CounterError> {
        let now = Instant::now();
        let mut windows = self.windows.lock();

        if windows.len() > 1024 {
            windows.retain(|_, w| w.expires_at > now);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            expires_at: now + window,
        });
        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = now + window;
        }
        entry.count += by;

        Ok(WindowCount {
            count: entry.count,
            resets_in: entry.expires_at - now,
        })
    }

    async fn current(&self, key: &str) -> Result<WindowCount, CounterError> {
        let now = Instant::now();
        let windows = self.windows.lock();
        Ok(match windows.get(key) {
            Some(w) if w.expires_at > now => WindowCount {
                count: w.count,
                resets_in: w.expires_at - now,
            },
            _ => WindowCount {
                count: 0,
                resets_in: Duration::ZERO,
            },
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

const INCREMENT_SCRIPT: &str = r"
local current = redis.call('INCRBY', KEYS[1], ARGV[1])
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    ttl = tonumber(ARGV[2])
end
return {current, ttl}
";

/// Redis counters shared across instances
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    script: Script,
}

impl RedisCounterStore {
    /// Wrap an established connection
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            script: Script::new(INCREMENT_SCRIPT),
        }
    }
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, by: i64, window: Duration) -> Result<WindowCount, CounterError> {
        let mut conn = self.connection.clone();
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1);

        let (count, ttl_ms): (i64, i64) = self
            .script
            .key(key)
            .arg(by)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CounterError::Unavailable(e.to_string()))?;

        Ok(WindowCount {
            count,
            resets_in: millis(ttl_ms),
        })
    }

    async fn current(&self, key: &str) -> Result<WindowCount, CounterError> {
        let mut conn = self.connection.clone();
        let (count, ttl_ms): (Option<i64>, i64) = redis::pipe()
            .get(key)
            .pttl(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CounterError::Unavailable(e.to_string()))?;

        Ok(WindowCount {
            count: count.unwrap_or(0),
            resets_in: millis(ttl_ms),
        })
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Window length
    pub window: Duration,
    /// Prefix for counter keys
    pub key_prefix: String,
    /// Admit requests when the counter backend fails
    pub fail_open: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            key_prefix: "llm-gateway:".to_string(),
            fail_open: true,
        }
    }
}

/// Budgets of one provider; non-positive values mean unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProviderLimits {
    /// Requests per window
    pub requests: i64,
    /// Tokens per window
    pub tokens: i64,
}

impl ProviderLimits {
    /// Create limits
    #[must_use]
    pub fn new(requests: i64, tokens: i64) -> Self {
        Self { requests, tokens }
    }

    /// Whether neither budget applies
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.requests <= 0 && self.tokens <= 0
    }
}

/// Outcome of a rate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request may proceed
    Allowed {
        /// Requests left in the window; `None` when unlimited or unknown
        remaining: Option<i64>,
    },
    /// Budget exhausted
    Denied {
        /// Time until the window resets
        retry_after: Duration,
    },
}

impl Admission {
    /// Whether the request may proceed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Per-provider rate limiter over a shared counter store
pub struct RateLimiter {
    store: std::sync::Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(store: std::sync::Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Limiter configuration
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn request_key(&self, provider: &str) -> String {
        format!("{}ratelimit:{provider}", self.config.key_prefix)
    }

    fn token_key(&self, provider: &str) -> String {
        format!("{}ratelimit:{provider}:tokens", self.config.key_prefix)
    }

    fn on_backend_error(&self, provider: &str, error: &CounterError) -> Admission {
        warn!(
            provider = %provider,
            backend = self.store.name(),
            fail_open = self.config.fail_open,
            error = %error,
            "Rate limit backend unavailable"
        );
        if self.config.fail_open {
            Admission::Allowed { remaining: None }
        } else {
            Admission::Denied {
                retry_after: self.config.window,
            }
        }
    }

    /// Count one request against the provider and decide admission
    pub async fn check(&self, provider: &str, limits: ProviderLimits) -> Admission {
        if limits.is_unlimited() {
            return Admission::Allowed { remaining: None };
        }

        if limits.tokens > 0 {
            match self.store.current(&self.token_key(provider)).await {
                Ok(used) if used.count >= limits.tokens => {
                    debug!(provider = %provider, used = used.count, limit = limits.tokens, "Token budget exhausted");
                    return Admission::Denied {
                        retry_after: used.resets_in,
                    };
                }
                Ok(_) => {}
                Err(e) => return self.on_backend_error(provider, &e),
            }
        }

        if limits.requests <= 0 {
            return Admission::Allowed { remaining: None };
        }

        match self
            .store
            .increment(&self.request_key(provider), 1, self.config.window)
            .await
        {
            Ok(window) if window.count > limits.requests => {
                debug!(provider = %provider, count = window.count, limit = limits.requests, "Request budget exhausted");
                Admission::Denied {
                    retry_after: window.resets_in,
                }
            }
            Ok(window) => Admission::Allowed {
                remaining: Some(limits.requests - window.count),
            },
            Err(e) => self.on_backend_error(provider, &e),
        }
    }

    /// Requests left in the current window without consuming one
    pub async fn remaining(&self, provider: &str, limits: ProviderLimits) -> Option<i64> {
        if limits.requests <= 0 {
            return None;
        }
        match self.store.current(&self.request_key(provider)).await {
            Ok(window) => Some((limits.requests - window.count).max(0)),
            Err(e) => {
                warn!(provider = %provider, error = %e, "Rate limit backend unavailable");
                None
            }
        }
    }

    /// Add consumed tokens to the provider's token window
    pub async fn record_tokens(&self, provider: &str, limits: ProviderLimits, tokens: u64) {
        if limits.tokens <= 0 || tokens == 0 {
            return;
        }
        let by = i64::try_from(tokens).unwrap_or(i64::MAX);
        if let Err(e) = self
            .store
            .increment(&self.token_key(provider), by, self.config.window)
            .await
        {
            warn!(provider = %provider, tokens, error = %e, "Failed to record token usage");
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend", &self.store.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn increment(&self, _: &str, _: i64, _: Duration) -> Result<WindowCount, CounterError> {
            Err(CounterError::Unavailable("connection refused".to_string()))
        }

        async fn current(&self, _: &str) -> Result<WindowCount, CounterError> {
            Err(CounterError::Unavailable("connection refused".to_string()))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCounterStore::new()), RateLimitConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_denies_after_budget_and_resets_with_window() {
        let limiter = limiter();
        let limits = ProviderLimits::new(2, 0);

        assert_eq!(limiter.check("claude", limits).await, Admission::Allowed { remaining: Some(1) });
        assert_eq!(limiter.check("claude", limits).await, Admission::Allowed { remaining: Some(0) });

        tokio::time::advance(Duration::from_secs(20)).await;
        match limiter.check("claude", limits).await {
            Admission::Denied { retry_after } => assert_eq!(retry_after, Duration::from_secs(40)),
            other => panic!("expected denial, got {other:?}"),
        }

        tokio::time::advance(Duration::from_secs(41)).await;
        assert!(limiter.check("claude", limits).await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_providers_have_separate_windows() {
        let limiter = limiter();
        let limits = ProviderLimits::new(1, 0);
        assert!(limiter.check("claude", limits).await.is_allowed());
        assert!(!limiter.check("claude", limits).await.is_allowed());
        assert!(limiter.check("openai", limits).await.is_allowed());
    }

    #[tokio::test]
    async fn test_unlimited_skips_store() {
        let limiter = RateLimiter::new(
            Arc::new(BrokenStore),
            RateLimitConfig {
                fail_open: false,
                ..Default::default()
            },
        );
        for _ in 0..100 {
            assert!(limiter.check("claude", ProviderLimits::new(0, -1)).await.is_allowed());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_budget() {
        let limiter = limiter();
        let limits = ProviderLimits::new(0, 1000);

        assert!(limiter.check("groq", limits).await.is_allowed());
        limiter.record_tokens("groq", limits, 600).await;
        assert!(limiter.check("groq", limits).await.is_allowed());
        limiter.record_tokens("groq", limits, 400).await;
        assert!(!limiter.check("groq", limits).await.is_allowed());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check("groq", limits).await.is_allowed());
    }

    #[tokio::test]
    async fn test_backend_failure_policy() {
        let open = RateLimiter::new(Arc::new(BrokenStore), RateLimitConfig::default());
        assert!(open.check("claude", ProviderLimits::new(5, 0)).await.is_allowed());

        let closed = RateLimiter::new(
            Arc::new(BrokenStore),
            RateLimitConfig {
                fail_open: false,
                window: Duration::from_secs(30),
                ..Default::default()
            },
        );
        assert_eq!(
            closed.check("claude", ProviderLimits::new(5, 0)).await,
            Admission::Denied {
                retry_after: Duration::from_secs(30)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_does_not_consume() {
        let limiter = limiter();
        let limits = ProviderLimits::new(3, 0);
        limiter.check("claude", limits).await;
        assert_eq!(limiter.remaining("claude", limits).await, Some(2));
        assert_eq!(limiter.remaining("claude", limits).await, Some(2));
        assert_eq!(limiter.remaining("claude", ProviderLimits::default()).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_checks_never_exceed_budget() {
        let limiter = Arc::new(limiter());
        let limits = ProviderLimits::new(10, 0);
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let l = Arc::clone(&limiter);
                tokio::spawn(async move { l.check("claude", limits).await.is_allowed() })
            })
            .collect();

        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
