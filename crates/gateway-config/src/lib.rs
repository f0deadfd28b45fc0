//! # Gateway Config
//!
//! Configuration for the LLM Gateway.
//!
//! Configuration is layered: built-in defaults, then an optional YAML or TOML
//! file, then `GATEWAY_*` environment variables. The result is validated before
//! anything is started.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod loader;
mod settings;

pub use error::{ConfigError, Result};
pub use loader::{load_config, load_config_from, parse_config, ConfigFormat, CONFIG_PATH_ENV};
pub use settings::{
    CacheSettings, DatabaseSettings, GatewayConfig, LogFormat, LoggingSettings, PricingEntry,
    ProviderSeed, RateLimitSettings, RedisSettings, RetrySettings, RouteSetting, RoutingSettings,
    SecuritySettings, ServerSettings, StoreBackend, UpstreamSettings, UsageSettings,
};
