//! Generation and metrics handlers.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use gateway_core::{GenerateRequest, GenerateResponse};
use std::sync::Arc;
use tracing::{error, instrument, Instrument, Span};

use crate::{
    error::ApiError,
    extractors::{JsonBody, RequestId},
    state::AppState,
};

/// `POST /generate`
///
/// The pipeline runs on its own task so the usage row is still written when
/// the request timeout fires or the client goes away.
#[instrument(
    name = "http.generate",
    skip_all,
    fields(request_id = %request_id, task_type = %body.task_type)
)]
pub async fn generate(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    JsonBody(body): JsonBody<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let task = tokio::spawn(
        async move { orchestrator.generate(&request_id, body).await }.instrument(Span::current()),
    );

    match task.await {
        Ok(result) => Ok(Json(result?)),
        Err(e) => {
            error!(error = %e, "Generation task failed");
            Err(ApiError::internal("generation task failed"))
        }
    }
}

/// `GET /metrics` in the Prometheus text format
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .metrics
        .gather()
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
