//! Response cache keyed by request fingerprint.
//!
//! The cache is an optimization only: backend failures degrade to a miss on
//! reads and to a no-op on writes.

use async_trait::async_trait;
use gateway_core::{normalize_text, CompletionRequest, GenerateResponse};
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Error types for cache backends
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend unreachable or returned an error
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    /// Stored value could not be decoded
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Byte store with per-entry expiry
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value from the cache
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value in the cache with TTL, replacing any previous value
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Get backend name for logs
    fn name(&self) -> &'static str;
}

#[derive(Debug)]
struct LocalEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

/// Bounded in-process cache backend
#[derive(Debug)]
pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, LocalEntry>>,
    max_entries: usize,
}

impl MemoryCacheBackend {
    /// Create a backend holding at most `max_entries` values
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Live entries
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.expires_at > now).count()
    }

    /// Whether no live entry exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict(entries: &mut HashMap<String, LocalEntry>, max_entries: usize, now: Instant) {
    entries.retain(|_, e| e.expires_at > now);

    while entries.len() >= max_entries {
        let soonest = entries
            .iter()
            .min_by_key(|(_, e)| e.expires_at)
            .map(|(k, _)| k.clone());
        match soonest {
            Some(key) => {
                entries.remove(&key);
            }
            None => break,
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.data.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            evict(&mut entries, self.max_entries, now);
        }
        entries.insert(
            key.to_string(),
            LocalEntry {
                data: value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis cache backend shared across instances
#[derive(Clone)]
pub struct RedisCacheBackend {
    connection: ConnectionManager,
}

impl RedisCacheBackend {
    /// Wrap an established connection
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

impl std::fmt::Debug for RedisCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    provider: &'a str,
    model: &'a str,
    prompt: String,
    system: Option<String>,
    max_tokens: u32,
    temperature: String,
    json_mode: bool,
}

/// Stable SHA-256 fingerprint of a resolved request, hex encoded
#[must_use]
pub fn fingerprint(provider: &str, request: &CompletionRequest) -> String {
    let input = FingerprintInput {
        provider,
        model: &request.model,
        prompt: normalize_text(&request.prompt),
        system: request
            .system
            .as_deref()
            .map(normalize_text)
            .filter(|s| !s.is_empty()),
        max_tokens: request.max_tokens.value(),
        temperature: format!("{:.3}", request.temperature.value()),
        json_mode: request.json_mode,
    };

    // Serializing a struct of strings and integers cannot fail.
    let canonical = serde_json::to_vec(&input).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

/// Response cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether lookups and stores happen at all
    pub enabled: bool,
    /// Entry lifetime
    pub ttl: Duration,
    /// Prefix for cache keys
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
            key_prefix: "llm-gateway:".to_string(),
        }
    }
}

/// Fingerprint-keyed cache of generated responses
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl ResponseCache {
    /// Create a new cache over a backend
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    /// Cache configuration
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Storage key for a resolved request
    #[must_use]
    pub fn key(&self, provider: &str, request: &CompletionRequest) -> String {
        format!("{}cache:{}", self.config.key_prefix, fingerprint(provider, request))
    }

    /// Look up a response; hits come back with `cached = true`
    pub async fn get(&self, key: &str) -> Option<GenerateResponse> {
        if !self.config.enabled {
            return None;
        }

        let bytes = match self.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<GenerateResponse>(&bytes) {
            Ok(mut response) => {
                debug!(key = %key, "Cache hit");
                response.cached = true;
                Some(response)
            }
            Err(e) => {
                let error = CacheError::Serialization(e.to_string());
                warn!(key = %key, error = %error, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Store a response under `key`, replacing any previous entry
    pub async fn put(&self, key: &str, response: &GenerateResponse) {
        if !self.config.enabled {
            return;
        }

        let mut stored = response.clone();
        stored.cached = false;
        let bytes = match serde_json::to_vec(&stored) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode response for cache");
                return;
            }
        };

        if let Err(e) = self.backend.set(key, bytes, self.config.ttl).await {
            warn!(backend = self.backend.name(), error = %e, "Cache write failed");
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{MaxTokens, Temperature};

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _: &str) -> CacheResult<Option<Vec<u8>>> {
            Err(CacheError::Unavailable("timeout".to_string()))
        }

        async fn set(&self, _: &str, _: Vec<u8>, _: Duration) -> CacheResult<()> {
            Err(CacheError::Unavailable("timeout".to_string()))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn response() -> GenerateResponse {
        GenerateResponse {
            content: "Paris".to_string(),
            provider: "claude".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            input_tokens: 10,
            output_tokens: 2,
            cost_usd: 0.00006,
            cached: false,
            latency_ms: 420,
        }
    }

    fn cache(ttl: Duration) -> ResponseCache {
        ResponseCache::new(
            Arc::new(MemoryCacheBackend::new(16)),
            CacheConfig {
                ttl,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_fingerprint_normalizes_line_endings_and_whitespace() {
        let a = CompletionRequest::new("m", "  line one\r\nline two\n");
        let b = CompletionRequest::new("m", "line one\nline two");
        assert_eq!(fingerprint("claude", &a), fingerprint("claude", &b));
        assert_eq!(fingerprint("claude", &a).len(), 64);
    }

    #[test]
    fn test_verbatim_upstream_text_shares_a_fingerprint() {
        let build = |prompt: &str, system: &str| {
            let request = gateway_core::GenerateRequest::builder()
                .user_id("u1")
                .service("search")
                .prompt(prompt)
                .system(system)
                .build();
            let params = request.validate().unwrap();
            CompletionRequest::from_generate(&request, params, "m")
        };
        let raw = build("  what is\r\nthe capital?  ", "\r\nbe brief ");
        let clean = build("what is\nthe capital?", "be brief");

        assert_ne!(raw.prompt, clean.prompt);
        assert_eq!(fingerprint("claude", &raw), fingerprint("claude", &clean));
    }

    #[test]
    fn test_fingerprint_separates_every_field() {
        let base = CompletionRequest::new("m", "p");
        let key = fingerprint("claude", &base);

        let variants = [
            fingerprint("openai", &base),
            fingerprint("claude", &CompletionRequest::new("m2", "p")),
            fingerprint("claude", &CompletionRequest::new("m", "q")),
            fingerprint("claude", &base.clone().with_system("s")),
            fingerprint("claude", &base.clone().with_max_tokens(MaxTokens::new(7).unwrap())),
            fingerprint("claude", &base.clone().with_temperature(Temperature::new(0.1).unwrap())),
            fingerprint("claude", &base.clone().with_json_mode(true)),
        ];
        for v in &variants {
            assert_ne!(v, &key);
        }
    }

    #[test]
    fn test_fingerprint_avoids_field_boundary_collisions() {
        let a = fingerprint("ab", &CompletionRequest::new("c", "p"));
        let b = fingerprint("a", &CompletionRequest::new("bc", "p"));
        assert_ne!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_marks_cached_and_expires() {
        let cache = cache(Duration::from_secs(60));
        let key = cache.key("claude", &CompletionRequest::new("m", "capital of France?"));

        assert!(cache.get(&key).await.is_none());
        cache.put(&key, &response()).await;

        let hit = cache.get(&key).await.unwrap();
        assert!(hit.cached);
        assert_eq!(hit.content, "Paris");
        assert_eq!(hit.provider, "claude");

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = cache(Duration::from_secs(60));
        cache.put("k", &response()).await;
        let mut newer = response();
        newer.content = "Paris, France".to_string();
        cache.put("k", &newer).await;
        assert_eq!(cache.get("k").await.unwrap().content, "Paris, France");
    }

    #[tokio::test]
    async fn test_backend_failure_degrades_to_miss() {
        let cache = ResponseCache::new(Arc::new(BrokenBackend), CacheConfig::default());
        cache.put("k", &response()).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let cache = ResponseCache::new(
            Arc::new(MemoryCacheBackend::new(4)),
            CacheConfig {
                enabled: false,
                ..Default::default()
            },
        );
        cache.put("k", &response()).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let backend = Arc::new(MemoryCacheBackend::new(4));
        backend.set("k", b"not json".to_vec(), Duration::from_secs(5)).await.unwrap();
        let cache = ResponseCache::new(backend, CacheConfig::default());
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_backend_evicts_expired_first_then_soonest() {
        let backend = MemoryCacheBackend::new(2);
        backend.set("short", vec![1], Duration::from_secs(1)).await.unwrap();
        backend.set("long", vec![2], Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        backend.set("new", vec![3], Duration::from_secs(50)).await.unwrap();
        assert!(backend.get("long").await.unwrap().is_some());
        assert!(backend.get("new").await.unwrap().is_some());

        backend.set("newest", vec![4], Duration::from_secs(100)).await.unwrap();
        assert!(backend.get("new").await.unwrap().is_none());
        assert_eq!(backend.len(), 2);
    }
}
