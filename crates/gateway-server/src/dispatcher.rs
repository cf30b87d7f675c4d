//! Upstream request construction.
//!
//! Finds the requested model in the body, checks it against the caller's
//! access list and builds the outbound request with that model's endpoint,
//! credential and reliability policy.

use bytes::Bytes;
use gateway_config::UpstreamSettings;
use gateway_core::{AccessibleModel, GatewayError, ReliabilityPolicy, RequestContext};
use gateway_resilience::UpstreamRequest;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use serde::Deserialize;
use tracing::debug;

/// Headers that describe a single connection and are never forwarded.
pub const HOP_BY_HOP_HEADERS: [&str; 7] = [
    "connection",
    "transfer-encoding",
    "keep-alive",
    "proxy-connection",
    "upgrade",
    "te",
    "trailer",
];

/// Whether `name` is a hop-by-hop header.
#[must_use]
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

#[derive(Deserialize)]
struct ModelField {
    model: Option<String>,
}

/// Read the `model` field of a JSON request body.
pub fn detect_model(body: &[u8]) -> Result<String, GatewayError> {
    let parsed: ModelField =
        serde_json::from_slice(body).map_err(|e| GatewayError::Detection(e.to_string()))?;
    parsed
        .model
        .ok_or_else(|| GatewayError::Detection("request body has no model field".to_string()))
}

/// Outbound request plus the model it targets.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    /// Matched accessible model
    pub model: AccessibleModel,
    /// Timeout and retry policy for the call
    pub policy: ReliabilityPolicy,
    /// Buffered outbound request
    pub request: UpstreamRequest,
}

#[derive(Debug, Clone)]
enum Backend {
    Model,
    Dummy(String),
    DummyWithoutHost,
}

/// Builds outbound requests for authenticated callers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    backend: Backend,
    defaults: ReliabilityPolicy,
}

impl Dispatcher {
    /// Create a dispatcher from upstream settings.
    pub fn new(settings: &UpstreamSettings) -> Self {
        let backend = match (settings.use_dummy_backend, &settings.dummy_backend_host) {
            (false, _) => Backend::Model,
            (true, Some(host)) if !host.is_empty() => Backend::Dummy(host.clone()),
            (true, _) => Backend::DummyWithoutHost,
        };
        Self {
            backend,
            defaults: settings.default_policy(),
        }
    }

    /// Whether calls go to the dummy backend.
    pub fn uses_dummy_backend(&self) -> bool {
        !matches!(self.backend, Backend::Model)
    }

    fn base_url<'a>(&'a self, model: &'a AccessibleModel) -> Result<&'a str, GatewayError> {
        match &self.backend {
            Backend::Model => Ok(&model.api_endpoint),
            Backend::Dummy(host) => Ok(host),
            Backend::DummyWithoutHost => Err(GatewayError::configuration(
                "dummy backend enabled but DUMMY_BACKEND_HOST is not set",
            )),
        }
    }

    /// Resolve the model and build the outbound request.
    pub fn dispatch(
        &self,
        ctx: &RequestContext,
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<DispatchPlan, GatewayError> {
        let requested = detect_model(&body)?;
        let model = ctx
            .find_model(&requested)
            .cloned()
            .ok_or_else(|| GatewayError::access_denied(requested.as_str()))?;

        let url = target_url(self.base_url(&model)?, uri);
        let mut outbound = forwardable_headers(headers);
        if !self.uses_dummy_backend() {
            let mut credential = HeaderValue::from_str(&format!("Bearer {}", model.api_token))
                .map_err(|_| {
                    GatewayError::configuration(format!(
                        "model {} has an API token that is not a valid header value",
                        model.id
                    ))
                })?;
            credential.set_sensitive(true);
            outbound.insert(header::AUTHORIZATION, credential);
        }

        debug!(
            org_id = %ctx.org_id,
            model = %model.model_id,
            provider = %model.provider,
            %url,
            "dispatching request"
        );

        Ok(DispatchPlan {
            policy: model.reliability(&self.defaults),
            request: UpstreamRequest {
                method,
                url,
                headers: outbound,
                body,
            },
            model,
        })
    }
}

/// `base + path`, plus `?query` when present.
#[must_use]
pub fn target_url(base: &str, uri: &Uri) -> String {
    let mut url = format!("{}{}", base.trim_end_matches('/'), uri.path());
    if let Some(query) = uri.query().filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// Inbound headers minus credentials, framing and hop-by-hop headers.
#[must_use]
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name == header::AUTHORIZATION
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || is_hop_by_hop(name)
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
