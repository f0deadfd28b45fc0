//! Configuration sections.

use gateway_core::ProviderSettings;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener and inbound auth
    #[validate(nested)]
    pub server: ServerSettings,
    /// Relational store
    #[validate(nested)]
    pub database: DatabaseSettings,
    /// Shared Redis; in-process stores are used when absent
    pub redis: Option<RedisSettings>,
    /// Response cache
    #[validate(nested)]
    pub cache: CacheSettings,
    /// Per-provider rate limiting
    pub rate_limit: RateLimitSettings,
    /// Upstream retry policy
    #[validate(nested)]
    pub retry: RetrySettings,
    /// Upstream HTTP client
    pub upstream: UpstreamSettings,
    /// Routing defaults
    pub routing: RoutingSettings,
    /// Usage ledger
    #[validate(nested)]
    pub usage: UsageSettings,
    /// Log output
    pub logging: LoggingSettings,
    /// Credential encryption
    pub security: SecuritySettings,
    /// Extra or replacement pricing entries
    pub pricing: Vec<PricingEntry>,
    /// Providers inserted at startup when absent from the store
    pub providers: Vec<ProviderSeed>,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address
    #[validate(length(min = 1))]
    pub host: String,
    /// Bind port
    #[validate(range(min = 1))]
    pub port: u16,
    /// Shared key downstream services send in `X-Service-Key`
    pub service_key: Option<SecretString>,
    /// Key for `/admin` routes; admin routes are disabled when absent
    pub admin_key: Option<SecretString>,
    /// Whole-request timeout for inbound calls; must cover the full upstream retry budget
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Time allowed for in-flight requests on shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            service_key: None,
            admin_key: None,
            request_timeout: Duration::from_secs(200),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Relational store settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `sqlite://...` or `postgres://...`
    #[validate(length(min = 1))]
    pub url: String,
    /// Pool upper bound
    #[validate(range(min = 1, max = 512))]
    pub max_connections: u32,
    /// Pool lower bound
    pub min_connections: u32,
    /// Connect and acquire timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Apply pending migrations at startup
    pub run_migrations: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://llm-gateway.db?mode=rwc".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(10),
            run_migrations: true,
        }
    }
}

/// Redis connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    /// `redis://host:port/db`
    pub url: String,
    /// Prefix prepended to every key
    pub key_prefix: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "llm-gateway:".to_string(),
        }
    }
}

/// Where an ephemeral store lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Redis when configured, otherwise memory
    #[default]
    Auto,
    /// In-process; single-instance deployments only
    Memory,
    /// Shared Redis
    Redis,
}

/// Response cache settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct CacheSettings {
    /// Master switch
    pub enabled: bool,
    /// Entry lifetime
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Storage backend
    pub backend: StoreBackend,
    /// Capacity of the in-process backend
    #[validate(range(min = 1))]
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
            backend: StoreBackend::Auto,
            max_entries: 10_000,
        }
    }
}

/// Rate limiter settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Fixed window length
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Counter storage backend
    pub backend: StoreBackend,
    /// Admit requests when the counter store cannot be reached
    pub fail_open: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            backend: StoreBackend::Auto,
            fail_open: true,
        }
    }
}

/// Upstream retry settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt
    #[validate(range(max = 10))]
    pub max_retries: u32,
    /// First backoff delay
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Backoff ceiling
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Jitter factor (0.0 - 1.0)
    #[validate(range(min = 0.0, max = 1.0))]
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            jitter: 0.2,
        }
    }
}

/// Upstream HTTP client settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Per-attempt timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// TCP connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// A provider/model pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteSetting {
    /// Provider name
    pub provider: String,
    /// Model id
    pub model: String,
}

/// Routing defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Provider used when nothing else matches
    pub default_provider: String,
    /// Model used when nothing else matches
    pub default_model: String,
    /// Per-service defaults keyed by service name
    pub services: HashMap<String, RouteSetting>,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            default_provider: "claude".to_string(),
            default_model: "claude-sonnet-4-5-20250929".to_string(),
            services: HashMap::new(),
        }
    }
}

/// Usage ledger settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct UsageSettings {
    /// Characters of prompt kept in each row
    #[validate(range(max = 4000))]
    pub prompt_preview_chars: usize,
    /// Write attempts before giving up
    #[validate(range(min = 1, max = 10))]
    pub write_attempts: u32,
    /// Delay before the first write retry; doubles per attempt
    #[serde(with = "humantime_serde")]
    pub write_backoff: Duration,
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            prompt_preview_chars: 200,
            write_attempts: 3,
            write_backoff: Duration::from_millis(50),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Multi-line human output
    Pretty,
    /// Single-line human output
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Log settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, e.g. `info` or `gateway_server=debug,info`
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Credential encryption settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Base64 encoded 32-byte AES-256-GCM key
    pub encryption_key: Option<SecretString>,
}

/// One pricing row in USD per million tokens
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PricingEntry {
    /// Provider name
    pub provider: String,
    /// Model id
    pub model: String,
    /// Input price per million tokens
    pub input_per_million: f64,
    /// Output price per million tokens
    pub output_per_million: f64,
}

/// Bootstrap provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSeed {
    /// Unique provider name
    pub name: String,
    /// Human readable name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Plaintext API key
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Custom base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// Enabled models
    #[serde(default)]
    pub models: Vec<String>,
    /// Enabled flag
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower is preferred
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Requests per minute
    #[serde(default)]
    pub rate_limit_rpm: i64,
    /// Tokens per minute
    #[serde(default)]
    pub rate_limit_tpm: i64,
    /// Protocol settings
    #[serde(default)]
    pub settings: Option<ProviderSettings>,
    /// Untyped vendor fields
    #[serde(default)]
    pub extra_config: serde_json::Map<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    100
}
