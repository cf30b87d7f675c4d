//! API key authentication.
//!
//! A caller presents a gateway key in `Authorization`, either as
//! `Bearer <key>` or as the bare key. The key is looked up in storage, the
//! owning organization's model grants are resolved through the policy cache,
//! and the resulting [`RequestContext`] is attached to the request.

use crate::error::ApiError;
use crate::last_used::LastUsedQueue;
use crate::policy_cache::AccessPolicyCache;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gateway_core::{GatewayError, KeyStore, RequestContext};
use http::{header, HeaderMap};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Pull the gateway key out of `Authorization`.
///
/// Returns `None` when the header is absent, not valid UTF-8, or the key
/// does not start with `prefix`.
pub fn extract_token<'a>(headers: &'a HeaderMap, prefix: &str) -> Option<&'a str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ").map_or(value, str::trim);
    (token.len() > prefix.len() && token.starts_with(prefix)).then_some(token)
}

/// Resolves request headers to an authenticated caller.
pub struct AuthResolver {
    keys: Arc<dyn KeyStore>,
    cache: Arc<AccessPolicyCache>,
    last_used: Arc<LastUsedQueue>,
    key_prefix: String,
}

impl std::fmt::Debug for AuthResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResolver")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl AuthResolver {
    /// Create a resolver.
    pub fn new(
        keys: Arc<dyn KeyStore>,
        cache: Arc<AccessPolicyCache>,
        last_used: Arc<LastUsedQueue>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            keys,
            cache,
            last_used,
            key_prefix: key_prefix.into(),
        }
    }

    /// Authenticate the caller behind `headers`.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<RequestContext, GatewayError> {
        let token =
            extract_token(headers, &self.key_prefix).ok_or_else(GatewayError::missing_token)?;

        let record = self
            .keys
            .find_active_key(token)
            .await
            .map_err(|e| {
                error!(error = %e, "API key lookup failed");
                GatewayError::internal("API key lookup failed")
            })?
            .ok_or_else(GatewayError::invalid_key)?;

        let models = self.cache.resolve(&record.org_id).await.map_err(|e| {
            error!(org_id = %record.org_id, error = %e, "failed to load model access");
            GatewayError::internal("failed to load model access")
        })?;

        self.last_used.record(&record.key_id);
        debug!(
            org_id = %record.org_id,
            key_id = %record.key_id,
            models = models.len(),
            "request authenticated"
        );
        Ok(RequestContext::new(record.org_id, record.key_id, models, token))
    }
}

/// Reject unauthenticated requests; attach the [`RequestContext`] otherwise.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    match state.auth.resolve(request.headers()).await {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => {
            warn!(error = %err, path = %request.uri().path(), "authentication failed");
            let response = ApiError::from(err).into_response();
            state.metrics.record_request(response.status().as_u16());
            response
        }
    }
}

/// Attach a [`RequestContext`] when the caller authenticates; never rejects.
pub async fn optional_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if request.headers().contains_key(header::AUTHORIZATION) {
        match state.auth.resolve(request.headers()).await {
            Ok(ctx) => {
                request.extensions_mut().insert(ctx);
            }
            Err(err) => debug!(error = %err, "continuing without authentication"),
        }
    }
    next.run(request).await
}
