//! `customer_overrides` table.
//!
//! A user-wide override is stored with an empty `service` so the
//! `(user_id, service)` uniqueness constraint covers it.

use crate::error::{Result, StorageError};
use crate::store::{from_millis, to_millis, SqlStore};
use async_trait::async_trait;
use gateway_core::{CustomerOverride, NewOverride, OverrideStore, StoreError};
use sqlx::any::AnyRow;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

const COLUMNS: &str = "id, user_id, service, provider, model, created_at, updated_at";

fn decode(row: &AnyRow) -> Result<CustomerOverride> {
    let id: String = row.try_get("id")?;
    let service: String = row.try_get("service")?;

    Ok(CustomerOverride {
        id: Uuid::parse_str(&id).map_err(|e| StorageError::Corrupt(format!("override id {id}: {e}")))?,
        user_id: row.try_get("user_id")?,
        service: Some(service).filter(|s| !s.is_empty()),
        provider: row.try_get("provider")?,
        model: row.try_get("model")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

impl SqlStore {
    async fn overrides_for_user(&self, user_id: &str) -> Result<Vec<CustomerOverride>> {
        let sql = format!("SELECT {COLUMNS} FROM customer_overrides WHERE user_id = $1 ORDER BY service");
        let rows = sqlx::query(&sql)
            .bind(user_id.to_string())
            .fetch_all(self.pool.inner())
            .await?;
        rows.iter().map(decode).collect()
    }

    async fn list_overrides(&self) -> Result<Vec<CustomerOverride>> {
        let sql = format!("SELECT {COLUMNS} FROM customer_overrides ORDER BY user_id, service");
        let rows = sqlx::query(&sql).fetch_all(self.pool.inner()).await?;
        rows.iter().map(decode).collect()
    }

    async fn upsert_override(&self, new: NewOverride) -> Result<CustomerOverride> {
        let candidate = CustomerOverride::from_new(new);
        let service = candidate.service.clone().unwrap_or_default();

        let mut tx = self.pool.inner().begin().await?;

        sqlx::query(&format!(
            "INSERT INTO customer_overrides ({COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (user_id, service) DO UPDATE SET
                provider = excluded.provider,
                model = excluded.model,
                updated_at = excluded.updated_at"
        ))
        .bind(candidate.id.to_string())
        .bind(candidate.user_id.clone())
        .bind(service.clone())
        .bind(candidate.provider.clone())
        .bind(candidate.model.clone())
        .bind(to_millis(candidate.created_at))
        .bind(to_millis(candidate.updated_at))
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM customer_overrides WHERE user_id = $1 AND service = $2"
        ))
        .bind(candidate.user_id.clone())
        .bind(service)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let saved = decode(&row)?;
        debug!(
            override_id = %saved.id,
            user_id = %saved.user_id,
            service = saved.service.as_deref().unwrap_or("*"),
            target = %format_args!("{}/{}", saved.provider, saved.model),
            "Override saved"
        );
        Ok(saved)
    }

    async fn delete_override(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM customer_overrides WHERE id = $1")
            .bind(id.to_string())
            .execute(self.pool.inner())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl OverrideStore for SqlStore {
    async fn for_user(&self, user_id: &str) -> std::result::Result<Vec<CustomerOverride>, StoreError> {
        Ok(self.overrides_for_user(user_id).await?)
    }

    async fn list(&self) -> std::result::Result<Vec<CustomerOverride>, StoreError> {
        Ok(self.list_overrides().await?)
    }

    async fn upsert(&self, new: NewOverride) -> std::result::Result<CustomerOverride, StoreError> {
        Ok(self.upsert_override(new).await?)
    }

    async fn delete(&self, id: Uuid) -> std::result::Result<bool, StoreError> {
        let existed = self.delete_override(id).await?;
        debug!(override_id = %id, existed, "Override deleted");
        Ok(existed)
    }
}
