//! `providers` table.

use crate::error::{Result, StorageError};
use crate::store::{from_flag, from_millis, to_flag, to_millis, SqlStore};
use async_trait::async_trait;
use chrono::Utc;
use gateway_core::{ProviderConfig, ProviderSettings, ProviderStore, StoreError};
use sqlx::any::AnyRow;
use sqlx::Row;
use tracing::debug;

const COLUMNS: &str = "name, display_name, api_key_encrypted, base_url, models, is_enabled, priority, \
     rate_limit_rpm, rate_limit_tpm, settings, extra_config, created_at, updated_at";

fn decode(row: &AnyRow) -> Result<ProviderConfig> {
    let models: String = row.try_get("models")?;
    let settings: Option<String> = row.try_get("settings")?;
    let extra_config: String = row.try_get("extra_config")?;
    let priority: i64 = row.try_get("priority")?;

    Ok(ProviderConfig {
        name: row.try_get("name")?,
        display_name: row.try_get("display_name")?,
        api_key_encrypted: row.try_get("api_key_encrypted")?,
        base_url: row.try_get("base_url")?,
        models: serde_json::from_str(&models)?,
        is_enabled: from_flag(row.try_get("is_enabled")?),
        priority: i32::try_from(priority)
            .map_err(|_| StorageError::Corrupt(format!("priority out of range: {priority}")))?,
        rate_limit_rpm: row.try_get("rate_limit_rpm")?,
        rate_limit_tpm: row.try_get("rate_limit_tpm")?,
        settings: settings
            .as_deref()
            .map(serde_json::from_str::<ProviderSettings>)
            .transpose()?,
        extra_config: serde_json::from_str(&extra_config)?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

impl SqlStore {
    async fn list_providers(&self) -> Result<Vec<ProviderConfig>> {
        let sql = format!("SELECT {COLUMNS} FROM providers ORDER BY priority, name");
        let rows = sqlx::query(&sql).fetch_all(self.pool.inner()).await?;
        rows.iter().map(decode).collect()
    }

    async fn get_provider(&self, name: &str) -> Result<Option<ProviderConfig>> {
        let sql = format!("SELECT {COLUMNS} FROM providers WHERE name = $1");
        let row = sqlx::query(&sql)
            .bind(name.to_string())
            .fetch_optional(self.pool.inner())
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn upsert_provider(&self, config: &ProviderConfig) -> Result<()> {
        let settings = config
            .settings
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let sql = format!(
            "INSERT INTO providers ({COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (name) DO UPDATE SET
                display_name = excluded.display_name,
                api_key_encrypted = excluded.api_key_encrypted,
                base_url = excluded.base_url,
                models = excluded.models,
                is_enabled = excluded.is_enabled,
                priority = excluded.priority,
                rate_limit_rpm = excluded.rate_limit_rpm,
                rate_limit_tpm = excluded.rate_limit_tpm,
                settings = excluded.settings,
                extra_config = excluded.extra_config,
                updated_at = excluded.updated_at"
        );

        sqlx::query(&sql)
            .bind(config.name.clone())
            .bind(config.display_name.clone())
            .bind(config.api_key_encrypted.clone())
            .bind(config.base_url.clone())
            .bind(serde_json::to_string(&config.models)?)
            .bind(to_flag(config.is_enabled))
            .bind(i64::from(config.priority))
            .bind(config.rate_limit_rpm)
            .bind(config.rate_limit_tpm)
            .bind(settings)
            .bind(serde_json::to_string(&config.extra_config)?)
            .bind(to_millis(config.created_at))
            .bind(to_millis(Utc::now()))
            .execute(self.pool.inner())
            .await?;

        debug!(provider = %config.name, enabled = config.is_enabled, "Provider saved");
        Ok(())
    }

    async fn set_provider_enabled(&self, name: &str, enabled: bool) -> Result<u64> {
        let result = sqlx::query("UPDATE providers SET is_enabled = $1, updated_at = $2 WHERE name = $3")
            .bind(to_flag(enabled))
            .bind(to_millis(Utc::now()))
            .bind(name.to_string())
            .execute(self.pool.inner())
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProviderStore for SqlStore {
    async fn list(&self) -> std::result::Result<Vec<ProviderConfig>, StoreError> {
        Ok(self.list_providers().await?)
    }

    async fn get(&self, name: &str) -> std::result::Result<Option<ProviderConfig>, StoreError> {
        Ok(self.get_provider(name).await?)
    }

    async fn upsert(&self, config: &ProviderConfig) -> std::result::Result<(), StoreError> {
        Ok(self.upsert_provider(config).await?)
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> std::result::Result<(), StoreError> {
        match self.set_provider_enabled(name, enabled).await? {
            0 => Err(StoreError::not_found("provider", name)),
            _ => {
                debug!(provider = %name, enabled, "Provider toggled");
                Ok(())
            }
        }
    }
}
