//! Request handlers.

use crate::{
    error::ApiError,
    relay::{relay, Accounting},
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use gateway_core::RequestContext;
use gateway_usage::UsageTrackerStats;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// `created` value reported for granted models and the static fallback.
pub const DEFAULT_MODEL_CREATED: i64 = 1_677_657_600;

/// OpenAI-compatible model entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelObject {
    /// Model identifier callers send in `model`
    pub id: String,
    /// Always `"model"`
    pub object: &'static str,
    /// Unix timestamp
    pub created: i64,
    /// Provider name
    pub owned_by: String,
}

impl ModelObject {
    fn new(id: impl Into<String>, created: i64, owned_by: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: "model",
            created,
            owned_by: owned_by.into(),
        }
    }
}

/// OpenAI-compatible model list.
#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    /// Always `"list"`
    pub object: &'static str,
    /// Models
    pub data: Vec<ModelObject>,
}

impl ModelsResponse {
    fn new(data: Vec<ModelObject>) -> Self {
        Self {
            object: "list",
            data,
        }
    }

    /// Returned when storage cannot be read.
    pub fn fallback() -> Self {
        Self::new(vec![
            ModelObject::new("gpt-3.5-turbo", DEFAULT_MODEL_CREATED, "openai"),
            ModelObject::new("gpt-4", DEFAULT_MODEL_CREATED, "openai"),
        ])
    }
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.gather() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "failed to encode metrics");
            ApiError::gateway(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics")
                .into_response()
        }
    }
}

/// Usage tracker and worker pool statistics.
pub async fn usage_stats(State(state): State<AppState>) -> Json<UsageTrackerStats> {
    Json(state.tracker.stats())
}

/// List models the caller can use, or the full catalog when anonymous.
pub async fn list_models(
    State(state): State<AppState>,
    ctx: Option<Extension<RequestContext>>,
) -> Json<ModelsResponse> {
    if let Some(Extension(ctx)) = ctx {
        let data: Vec<_> = ctx
            .accessible_models
            .iter()
            .filter(|m| m.is_active)
            .map(|m| ModelObject::new(&m.model_id, DEFAULT_MODEL_CREATED, &m.provider))
            .collect();
        info!(org_id = %ctx.org_id, models = data.len(), "listing accessible models");
        return Json(ModelsResponse::new(data));
    }

    match state.models.active_catalog().await {
        Ok(catalog) => {
            let data: Vec<_> = catalog
                .into_iter()
                .map(|m| ModelObject::new(m.model_id, m.created_at, m.provider))
                .collect();
            info!(models = data.len(), "listing model catalog");
            Json(ModelsResponse::new(data))
        }
        Err(e) => {
            warn!(error = %e, "failed to load model catalog, returning static list");
            Json(ModelsResponse::fallback())
        }
    }
}

/// Forward an authenticated call to the model it names.
#[instrument(skip_all, fields(org_id = %ctx.org_id, %method, path = %uri.path()))]
pub async fn proxy(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();

    let plan = match state
        .dispatcher
        .dispatch(&ctx, method, &uri, &headers, body.clone())
    {
        Ok(plan) => plan,
        Err(e) => {
            warn!(error = %e, "request rejected before dispatch");
            let response = ApiError::from(e).into_response();
            state.metrics.record_request(response.status().as_u16());
            return response;
        }
    };

    let accounting = Accounting::new(
        state.tracker.clone(),
        &ctx,
        &plan.model,
        uri.path(),
        body,
        started,
    );

    let response = match state.transport.send(&plan.request, &plan.policy).await {
        Ok(upstream) => {
            state.metrics.record_upstream(
                &plan.model.provider,
                upstream.elapsed,
                upstream.attempts.saturating_sub(1),
            );
            relay(upstream.response, accounting).await
        }
        Err(e) => accounting.fail(e),
    };

    state.metrics.record_request(response.status().as_u16());
    response
}
