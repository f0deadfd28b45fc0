//! # Gateway Resilience
//!
//! Protection around upstream calls for the LLM Gateway:
//! - Retry policy with bounded exponential backoff
//! - Per-provider fixed-window rate limiting over shared counters
//! - Fingerprint-keyed response cache
//!
//! Shared state lives behind the [`CounterStore`] and [`CacheBackend`] traits,
//! each with an in-process and a Redis implementation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod rate_limiter;
pub mod retry;

// Re-export main types
pub use cache::{
    fingerprint, CacheBackend, CacheConfig, CacheError, MemoryCacheBackend, RedisCacheBackend,
    ResponseCache,
};
pub use rate_limiter::{
    Admission, CounterError, CounterStore, MemoryCounterStore, ProviderLimits, RateLimitConfig,
    RateLimiter, RedisCounterStore, WindowCount,
};
pub use retry::{RetryConfig, RetryPolicy, RetryResult, Retryable};
