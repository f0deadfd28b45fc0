//! Loading: defaults, then file, then `GATEWAY_*` environment overrides.

use crate::error::{ConfigError, Result};
use crate::settings::{GatewayConfig, StoreBackend};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use validator::Validate;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML (`.yaml`, `.yml`)
    Yaml,
    /// TOML (`.toml`)
    Toml,
}

impl ConfigFormat {
    /// Pick a format from a file extension; YAML is the fallback
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

/// Load configuration using `GATEWAY_CONFIG` (if set) and the process environment
pub async fn load_config() -> Result<GatewayConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).ok();
    load_config_from(path.as_deref().map(Path::new)).await
}

/// Load configuration from an optional file plus the process environment
pub async fn load_config_from(path: Option<&Path>) -> Result<GatewayConfig> {
    let mut config = match path {
        Some(path) => {
            let contents = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            info!(path = %path.display(), "Loading configuration file");
            parse_config(&contents, ConfigFormat::from_path(path))?
        }
        None => {
            debug!("No configuration file given, using defaults");
            GatewayConfig::default()
        }
    };

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate_all()?;
    Ok(config)
}

/// Parse configuration text
pub fn parse_config(contents: &str, format: ConfigFormat) -> Result<GatewayConfig> {
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
            format: "yaml",
            message: e.to_string(),
        }),
        ConfigFormat::Toml => toml::from_str(contents).map_err(|e| ConfigError::Parse {
            format: "toml",
            message: e.to_string(),
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl GatewayConfig {
    /// Apply `GATEWAY_*` overrides read through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = non_empty(lookup("GATEWAY_HOST")) {
            self.server.host = host;
        }
        if let Some(port) = non_empty(lookup("GATEWAY_PORT")) {
            self.server.port = port.parse().map_err(|_| ConfigError::Env {
                var: "GATEWAY_PORT".to_string(),
                message: format!("'{port}' is not a valid port"),
            })?;
        }
        if let Some(key) = non_empty(lookup("GATEWAY_SERVICE_KEY")) {
            self.server.service_key = Some(SecretString::new(key));
        }
        if let Some(key) = non_empty(lookup("GATEWAY_ADMIN_KEY")) {
            self.server.admin_key = Some(SecretString::new(key));
        }
        if let Some(url) = non_empty(lookup("GATEWAY_DATABASE_URL")) {
            self.database.url = url;
        }
        if let Some(url) = non_empty(lookup("GATEWAY_REDIS_URL")) {
            self.redis.get_or_insert_with(Default::default).url = url;
        }
        if let Some(level) = non_empty(lookup("GATEWAY_LOG_LEVEL")) {
            self.logging.level = level;
        }
        if let Some(format) = non_empty(lookup("GATEWAY_LOG_FORMAT")) {
            self.logging.format = format.parse().map_err(|message| ConfigError::Env {
                var: "GATEWAY_LOG_FORMAT".to_string(),
                message,
            })?;
        }
        if let Some(key) = non_empty(lookup("GATEWAY_ENCRYPTION_KEY")) {
            self.security.encryption_key = Some(SecretString::new(key));
        }
        Ok(())
    }

    /// Structural validation plus cross-field checks
    pub fn validate_all(&self) -> Result<()> {
        self.validate()?;

        let service_key_set = self
            .server
            .service_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().is_empty());
        if !service_key_set {
            return Err(ConfigError::Invalid(
                "server.service_key (or GATEWAY_SERVICE_KEY) is required".to_string(),
            ));
        }

        if self.security.encryption_key.is_none() {
            return Err(ConfigError::Invalid(
                "security.encryption_key (or GATEWAY_ENCRYPTION_KEY) is required".to_string(),
            ));
        }

        if self.redis.is_none()
            && (self.cache.backend == StoreBackend::Redis
                || self.rate_limit.backend == StoreBackend::Redis)
        {
            return Err(ConfigError::Invalid(
                "redis backend selected but no redis section configured".to_string(),
            ));
        }

        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::Invalid(
                "rate_limit.window must be positive".to_string(),
            ));
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::Invalid(
                "retry.base_delay must not exceed retry.max_delay".to_string(),
            ));
        }

        let budget = self.upstream_budget();
        if self.server.request_timeout < budget {
            return Err(ConfigError::Invalid(format!(
                "server.request_timeout ({:?}) is shorter than the upstream retry budget ({budget:?})",
                self.server.request_timeout
            )));
        }

        if self.routing.default_provider.trim().is_empty()
            || self.routing.default_model.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "routing.default_provider and routing.default_model are required".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for seed in &self.providers {
            if seed.name.trim().is_empty() {
                return Err(ConfigError::Invalid("provider seed without a name".to_string()));
            }
            if !seen.insert(seed.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' is listed more than once",
                    seed.name
                )));
            }
            if let Some(base_url) = &seed.base_url {
                url::Url::parse(base_url).map_err(|e| {
                    ConfigError::Invalid(format!(
                        "provider '{}' has an invalid base_url: {e}",
                        seed.name
                    ))
                })?;
            }
        }

        for entry in &self.pricing {
            if entry.input_per_million < 0.0 || entry.output_per_million < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "negative price for {}/{}",
                    entry.provider, entry.model
                )));
            }
        }

        Ok(())
    }

    /// Worst-case time one generation spends upstream: every attempt timing
    /// out plus the longest backoff between attempts
    #[must_use]
    pub fn upstream_budget(&self) -> Duration {
        let attempts = self.retry.max_retries.saturating_add(1);
        self.upstream
            .timeout
            .saturating_mul(attempts)
            .saturating_add(self.retry.max_delay.saturating_mul(self.retry.max_retries))
    }

    /// Whether the cache should use Redis
    #[must_use]
    pub fn cache_uses_redis(&self) -> bool {
        uses_redis(self.cache.backend, self.redis.is_some())
    }

    /// Whether the rate limiter should use Redis
    #[must_use]
    pub fn rate_limit_uses_redis(&self) -> bool {
        uses_redis(self.rate_limit.backend, self.redis.is_some())
    }
}

fn uses_redis(backend: StoreBackend, redis_configured: bool) -> bool {
    match backend {
        StoreBackend::Redis => true,
        StoreBackend::Memory => false,
        StoreBackend::Auto => redis_configured,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::LogFormat;
    use std::collections::HashMap;
    use std::time::Duration;

    const YAML: &str = r#"
server:
  port: 9100
  service_key: "svc-secret"
  request_timeout: 5m
security:
  encryption_key: "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY="
cache:
  ttl: 30m
retry:
  max_retries: 3
  base_delay: 100ms
routing:
  services:
    seo:
      provider: openai
      model: gpt-4o-mini
providers:
  - name: claude
    api_key_env: ANTHROPIC_API_KEY
    rate_limit_rpm: 50
    models: [claude-sonnet-4-5-20250929]
  - name: deepseek
    base_url: https://api.deepseek.com/v1
    settings:
      family: openai_compatible
      default_model: deepseek-chat
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_yaml() {
        let config = parse_config(YAML, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.cache.ttl, Duration::from_secs(1800));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
        assert_eq!(config.routing.default_provider, "claude");
        assert_eq!(config.routing.services["seo"].model, "gpt-4o-mini");
        assert_eq!(config.providers.len(), 2);
        assert!(config.providers[1].settings.is_some());
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[server]
port = 7000
service_key = "k"

[security]
encryption_key = "abc"

[logging]
format = "pretty"
"#;
        let config = parse_config(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.routing.default_model, "claude-sonnet-4-5-20250929");
        assert!(!config.cache_uses_redis());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GatewayConfig::default();
        config
            .apply_env_overrides(env(&[
                ("GATEWAY_PORT", "9999"),
                ("GATEWAY_SERVICE_KEY", "from-env"),
                ("GATEWAY_REDIS_URL", "redis://cache:6379"),
                ("GATEWAY_LOG_FORMAT", "compact"),
                ("GATEWAY_ENCRYPTION_KEY", "k"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 9999);
        assert_eq!(
            config.server.service_key.as_ref().map(|k| k.expose_secret().clone()),
            Some("from-env".to_string())
        );
        assert_eq!(config.redis.as_ref().map(|r| r.url.as_str()), Some("redis://cache:6379"));
        assert!(config.cache_uses_redis());
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_invalid_env_port() {
        let mut config = GatewayConfig::default();
        let err = config
            .apply_env_overrides(env(&[("GATEWAY_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_missing_service_key_rejected() {
        let mut config = GatewayConfig::default();
        config.security.encryption_key = Some(SecretString::new("k".to_string()));
        assert!(matches!(config.validate_all(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_default_request_timeout_covers_upstream_budget() {
        let config = parse_config(YAML, ConfigFormat::Yaml).unwrap();
        let defaults = GatewayConfig::default();
        assert_eq!(defaults.upstream_budget(), Duration::from_secs(188));
        assert!(defaults.server.request_timeout >= defaults.upstream_budget());
        // max_retries 3 in the fixture: 4 x 60s + 3 x 4s
        assert_eq!(config.upstream_budget(), Duration::from_secs(252));
    }

    #[test]
    fn test_request_timeout_shorter_than_upstream_budget_rejected() {
        let mut config = parse_config(YAML, ConfigFormat::Yaml).unwrap();
        config.retry.max_retries = 2;
        config.server.request_timeout = Duration::from_secs(180);
        let err = config.validate_all().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("request_timeout")));

        config.server.request_timeout = config.upstream_budget();
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_redis_backend_requires_redis() {
        let mut config = parse_config(YAML, ConfigFormat::Yaml).unwrap();
        config.rate_limit.backend = StoreBackend::Redis;
        assert!(config.validate_all().is_err());
    }

    #[test]
    fn test_duplicate_seed_rejected() {
        let mut config = parse_config(YAML, ConfigFormat::Yaml).unwrap();
        let dup = config.providers[0].clone();
        config.providers.push(dup);
        assert!(config.validate_all().is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        tokio::fs::write(&path, YAML).await.unwrap();

        let config = load_config_from(Some(&path)).await.unwrap();
        assert_eq!(config.providers[0].rate_limit_rpm, 50);
    }
}
