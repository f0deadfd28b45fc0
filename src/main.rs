//! # LLM Gateway
//!
//! Single entry point for text generation across several LLM vendors, with
//! per-customer routing overrides, per-provider rate limits, a response cache
//! and a usage ledger.
//!
//! ## Usage
//!
//! ```bash
//! # Serve with defaults (local SQLite file, in-process cache and counters)
//! GATEWAY_ENCRYPTION_KEY=... llm-gateway
//!
//! # Custom config file
//! llm-gateway --config /etc/llm-gateway/config.yaml serve
//!
//! # Apply database migrations and exit
//! llm-gateway --config config.yaml migrate
//!
//! # Validate configuration without starting
//! llm-gateway --config config.yaml check-config
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gateway_config::{load_config_from, GatewayConfig, ProviderSeed};
use gateway_core::{OverrideStore, ProviderStore, UsageStore};
use gateway_providers::{ApiKeyCipher, ProviderUpdate};
use gateway_resilience::{CacheBackend, CounterStore, RedisCacheBackend, RedisCounterStore};
use gateway_server::{create_router, shutdown_signal, startup_check, AppState, Server};
use gateway_storage::{DatabaseKind, Migrator, SqlStore};
use gateway_telemetry::init_logging;
use redis::aio::ConnectionManager;
use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Command line interface
#[derive(Debug, Parser)]
#[command(name = "llm-gateway", version, about)]
struct Cli {
    /// Configuration file (YAML or TOML)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config_from(cli.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => migrate(&config).await,
        Command::CheckConfig => check_config(&config),
    };

    if let Err(e) = result {
        error!(error = %format_args!("{e:#}"), "Gateway failed");
        std::process::exit(1);
    }
}

async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting LLM Gateway");

    let cipher = cipher(&config)?;
    let store = SqlStore::connect(&config.database)
        .await
        .context("connecting to the database")?;
    let pool = store.pool().clone();
    let store = Arc::new(store);

    let mut builder = AppState::builder()
        .provider_store(Arc::clone(&store) as Arc<dyn ProviderStore>)
        .override_store(Arc::clone(&store) as Arc<dyn OverrideStore>)
        .usage_store(store as Arc<dyn UsageStore>)
        .cipher(cipher);

    if let Some(redis) = &config.redis {
        if config.cache_uses_redis() || config.rate_limit_uses_redis() {
            let connection = connect_redis(&redis.url).await?;
            if config.cache_uses_redis() {
                let backend: Arc<dyn CacheBackend> =
                    Arc::new(RedisCacheBackend::new(connection.clone()));
                builder = builder.cache_backend(backend);
            }
            if config.rate_limit_uses_redis() {
                let counters: Arc<dyn CounterStore> =
                    Arc::new(RedisCounterStore::new(connection));
                builder = builder.counter_store(counters);
            }
        }
    }

    let state = builder.config(config.clone()).build()?;

    let seeds = provider_seeds(&config.providers);
    let seeded = state.registry.seed(seeds).await?;
    info!(
        seeded,
        configured = config.providers.len(),
        "Provider seeds applied"
    );
    startup_check(&state, &config.routing.default_provider).await?;

    if !state.auth.service_key_required() {
        warn!("No service key configured, /generate is open to any caller");
    }
    if !state.auth.admin_enabled() {
        info!("No admin key configured, admin API is disabled");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let server = Server::bind(addr, config.server.shutdown_grace)
        .await
        .with_context(|| format!("binding {addr}"))?;
    let router = create_router(state);

    let result = server.run(router, shutdown_signal()).await;
    pool.close().await;
    info!("Database pool closed");
    result.context("serving HTTP")
}

async fn migrate(config: &GatewayConfig) -> anyhow::Result<()> {
    let mut settings = config.database.clone();
    settings.run_migrations = false;
    let store = SqlStore::connect(&settings)
        .await
        .context("connecting to the database")?;

    let migrator = Migrator::new(store.pool().clone());
    let applied = migrator.run_pending().await?;
    if applied.is_empty() {
        info!("Database schema is up to date");
    } else {
        info!(versions = ?applied, "Migrations applied");
    }

    store.pool().close().await;
    Ok(())
}

fn check_config(config: &GatewayConfig) -> anyhow::Result<()> {
    let kind = DatabaseKind::from_url(&config.database.url)
        .context("database.url must use the sqlite:// or postgres:// scheme")?;
    if config.security.encryption_key.is_none() && !is_memory_database(&config.database.url) {
        bail!("security.encryption_key is required with a persistent database");
    }
    if let Some(key) = &config.security.encryption_key {
        ApiKeyCipher::from_base64(key.expose_secret()).context("security.encryption_key")?;
    }

    info!(
        database = %kind,
        redis = config.redis.is_some(),
        cache_redis = config.cache_uses_redis(),
        rate_limit_redis = config.rate_limit_uses_redis(),
        providers = config.providers.len(),
        default_route = %format_args!(
            "{}/{}",
            config.routing.default_provider, config.routing.default_model
        ),
        "Configuration is valid"
    );
    Ok(())
}

/// Build the API key cipher from configuration.
///
/// An in-memory database may run with a throwaway key since nothing outlives
/// the process; persistent databases need the configured key.
fn cipher(config: &GatewayConfig) -> anyhow::Result<ApiKeyCipher> {
    match &config.security.encryption_key {
        Some(key) => {
            ApiKeyCipher::from_base64(key.expose_secret()).context("security.encryption_key")
        }
        None if is_memory_database(&config.database.url) => {
            warn!("No encryption key configured, using an ephemeral key");
            Ok(ApiKeyCipher::new(&ApiKeyCipher::generate_key())?)
        }
        None => bail!(
            "security.encryption_key (or GATEWAY_ENCRYPTION_KEY) is required with a persistent database"
        ),
    }
}

fn is_memory_database(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

async fn connect_redis(url: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(url).context("invalid redis url")?;
    let manager = ConnectionManager::new(client)
        .await
        .context("connecting to redis")?;
    info!("Connected to Redis");
    Ok(manager)
}

/// Turn configured seeds into registry updates, resolving keys from the environment
fn provider_seeds(seeds: &[ProviderSeed]) -> Vec<ProviderUpdate> {
    seeds
        .iter()
        .filter_map(|seed| {
            let api_key = seed.api_key.clone().or_else(|| {
                seed.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|key| !key.trim().is_empty())
                    .map(SecretString::new)
            });
            if api_key.is_none() {
                warn!(
                    provider = %seed.name,
                    env = seed.api_key_env.as_deref().unwrap_or(""),
                    "Skipping provider seed without an API key"
                );
                return None;
            }

            Some(ProviderUpdate {
                name: seed.name.clone(),
                display_name: seed.display_name.clone(),
                api_key,
                base_url: seed.base_url.clone(),
                models: Some(seed.models.clone()),
                enabled: Some(seed.enabled),
                priority: Some(seed.priority),
                rate_limit_rpm: Some(seed.rate_limit_rpm),
                rate_limit_tpm: Some(seed.rate_limit_tpm),
                settings: seed.settings.clone(),
                extra_config: Some(seed.extra_config.clone()),
            })
        })
        .collect()
}
