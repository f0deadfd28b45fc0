//! Administrative API under `/admin`.
//!
//! Providers are created and patched here (plaintext keys are encrypted before
//! they are stored), overrides are managed by (user, service) scope, and the
//! usage ledger can be read and summarized.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use gateway_core::{
    CustomerOverride, GatewayError, NewOverride, ProviderConfig, UsageLog, UsageQuery, UsageSummary,
};
use gateway_providers::ProviderUpdate;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{error::ApiError, extractors::JsonBody, state::AppState};

/// Body of `POST /admin/providers/:name/enabled`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EnabledBody {
    /// New flag
    pub enabled: bool,
}

/// `GET /admin/providers`
pub async fn list_providers(State(state): State<AppState>) -> Result<Json<Vec<ProviderConfig>>, ApiError> {
    Ok(Json(state.registry.configs().await?))
}

/// `PUT /admin/providers/:name`
#[instrument(skip(state, update))]
pub async fn upsert_provider(
    State(state): State<AppState>,
    Path(name): Path<String>,
    JsonBody(mut update): JsonBody<ProviderUpdate>,
) -> Result<Json<ProviderConfig>, ApiError> {
    update.name = name;
    Ok(Json(state.registry.upsert(update).await?))
}

/// `POST /admin/providers/:name/enabled`
#[instrument(skip(state))]
pub async fn set_provider_enabled(
    State(state): State<AppState>,
    Path(name): Path<String>,
    JsonBody(body): JsonBody<EnabledBody>,
) -> Result<StatusCode, ApiError> {
    state.registry.set_enabled(&name, body.enabled).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /admin/overrides`
pub async fn list_overrides(State(state): State<AppState>) -> Result<Json<Vec<CustomerOverride>>, ApiError> {
    Ok(Json(state.overrides.list().await.map_err(GatewayError::from)?))
}

/// `PUT /admin/overrides`
#[instrument(skip_all, fields(user_id = %new.user_id, service = ?new.service))]
pub async fn upsert_override(
    State(state): State<AppState>,
    JsonBody(new): JsonBody<NewOverride>,
) -> Result<Json<CustomerOverride>, ApiError> {
    for (field, value) in [
        ("user_id", &new.user_id),
        ("provider", &new.provider),
        ("model", &new.model),
    ] {
        if value.trim().is_empty() {
            return Err(GatewayError::validation(
                format!("{field} cannot be empty"),
                Some(field.to_string()),
                format!("empty_{field}"),
            )
            .into());
        }
    }

    let saved = state.overrides.upsert(new).await.map_err(GatewayError::from)?;
    info!(
        override_id = %saved.id,
        target = %format_args!("{}/{}", saved.provider, saved.model),
        "Override saved"
    );
    Ok(Json(saved))
}

/// `DELETE /admin/overrides/:id`
#[instrument(skip(state))]
pub async fn delete_override(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.overrides.delete(id).await.map_err(GatewayError::from)? {
        info!(override_id = %id, "Override deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("override '{id}' not found")))
    }
}

/// `GET /admin/usage`: newest first, at most `UsageQuery::MAX_LIMIT` rows
pub async fn list_usage(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<UsageLog>>, ApiError> {
    Ok(Json(state.usage.query(&query).await.map_err(GatewayError::from)?))
}

/// `GET /admin/usage/summary`
pub async fn usage_summary(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<UsageSummary>>, ApiError> {
    Ok(Json(state.usage.summarize(&query).await.map_err(GatewayError::from)?))
}
