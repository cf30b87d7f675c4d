//! Route definitions for the gateway API.

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, handlers, state::AppState};

/// Largest request body accepted for forwarding.
pub const MAX_REQUEST_BODY: usize = 32 * 1024 * 1024;

/// Create the main API router.
///
/// Every path without an explicit route is an authenticated proxy call, as
/// is any method other than `GET` on the operational and model routes.
pub fn create_router(state: AppState) -> Router {
    let proxy = Router::new()
        .fallback(handlers::proxy)
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_auth))
        .with_state(state.clone());

    Router::new()
        // Operational endpoints
        .route("/health", get(handlers::health).fallback_service(proxy.clone()))
        .route("/metrics", get(handlers::metrics).fallback_service(proxy.clone()))
        .route("/stats/usage", get(handlers::usage_stats).fallback_service(proxy.clone()))
        // Model listing, with or without a key
        .merge(model_routes(state.clone(), &proxy))
        .fallback_service(proxy)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn model_routes(state: AppState, proxy: &Router) -> Router<AppState> {
    Router::new()
        .route("/v1/models", get(handlers::list_models).fallback_service(proxy.clone()))
        .route("/models", get(handlers::list_models).fallback_service(proxy.clone()))
        .route_layer(middleware::from_fn_with_state(state, auth::optional_auth))
}
