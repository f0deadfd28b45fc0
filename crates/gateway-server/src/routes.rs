//! Route definitions for the gateway API.

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{admin, auth, handlers, health, state::AppState};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let generate = Router::new()
        .route("/generate", post(handlers::generate))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::require_service_key,
        ));

    let mut router = Router::new()
        .route("/health", get(health::health))
        .route("/health/providers", get(health::providers))
        .route("/metrics", get(handlers::metrics))
        .merge(generate);

    if state.auth.admin_enabled() {
        router = router.nest("/admin", admin_routes(&state));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(state.request_timeout)),
        )
        .with_state(state)
}

/// Admin routes, guarded by the admin key
fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/providers", get(admin::list_providers))
        .route("/providers/:name", put(admin::upsert_provider))
        .route("/providers/:name/enabled", post(admin::set_provider_enabled))
        .route("/overrides", get(admin::list_overrides).put(admin::upsert_override))
        .route("/overrides/:id", delete(admin::delete_override))
        .route("/usage", get(admin::list_usage))
        .route("/usage/summary", get(admin::usage_summary))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::require_admin_key,
        ))
}
