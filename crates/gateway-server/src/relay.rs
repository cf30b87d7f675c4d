//! Response relay.
//!
//! Copies the upstream status and headers to the caller, then either
//! buffers the body (JSON) or streams it chunk by chunk (event streams).
//! Either way the relayed bytes are captured and handed to the usage tracker
//! once the body is finished, including when the caller goes away early.

use crate::dispatcher::is_hop_by_hop;
use crate::error::ApiError;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use gateway_core::{AccessibleModel, GatewayError, RequestContext};
use gateway_usage::{is_streaming, UsageCapture, UsageTracker};
use http::{header, HeaderMap, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Largest piece written to the caller at once on a streamed body.
pub const RELAY_CHUNK_SIZE: usize = 4096;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// What the usage tracker needs to know about one call.
#[derive(Debug)]
pub struct Accounting {
    tracker: Arc<UsageTracker>,
    capture: UsageCapture,
    started: Instant,
}

impl Accounting {
    /// Start accounting for a call to `model`.
    pub fn new(
        tracker: Arc<UsageTracker>,
        ctx: &RequestContext,
        model: &AccessibleModel,
        endpoint: &str,
        request_body: Bytes,
        started: Instant,
    ) -> Self {
        Self {
            tracker,
            capture: UsageCapture {
                org_id: ctx.org_id.clone(),
                key_id: ctx.key_id.clone(),
                model_id: model.id.clone(),
                model_name: model.model_id.clone(),
                provider: model.provider.clone(),
                endpoint: endpoint.to_string(),
                request_id: None,
                status: 0,
                response_time: None,
                content_type: None,
                request_body,
                response_body: Bytes::new(),
            },
            started,
        }
    }

    fn with_response(
        mut self,
        status: StatusCode,
        content_type: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        self.capture.status = status.as_u16();
        self.capture.content_type = content_type;
        self.capture.request_id = request_id;
        self
    }

    fn submit(mut self, body: Bytes) {
        self.capture.response_time = Some(self.started.elapsed());
        self.capture.response_body = body;
        let org_id = self.capture.org_id.clone();
        if !self.tracker.track(self.capture) {
            debug!(%org_id, "usage capture not queued");
        }
    }

    /// Answer with a synthesized error and record the call with that body.
    pub fn fail(self, err: GatewayError) -> Response {
        warn!(error = %err, model = %self.capture.model_name, "upstream call failed");
        let api = ApiError::from(err);
        let body = Bytes::from(api.body().to_string());
        self.with_response(api.status(), Some(mime::APPLICATION_JSON.to_string()), None)
            .submit(body);
        api.into_response()
    }
}

/// Upstream headers minus `Set-Cookie` and hop-by-hop headers.
#[must_use]
pub fn relay_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if name == header::SET_COOKIE || is_hop_by_hop(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Relay `upstream` to the caller.
pub async fn relay(upstream: reqwest::Response, accounting: Accounting) -> Response {
    let status = upstream.status();
    let mut headers = relay_headers(upstream.headers());
    let content_type = header_str(upstream.headers(), header::CONTENT_TYPE.as_str());
    let request_id = header_str(upstream.headers(), REQUEST_ID_HEADER);
    let accounting = accounting.with_response(status, content_type.clone(), request_id);

    if is_streaming(content_type.as_deref(), b"") {
        debug!(status = status.as_u16(), "relaying streamed response");
        // Length is unknown once the body is re-chunked.
        headers.remove(header::CONTENT_LENGTH);
        let body = Body::from_stream(relay_stream(upstream.bytes_stream(), accounting));
        return build_response(status, headers, body);
    }

    match upstream.bytes().await {
        Ok(body) => {
            debug!(status = status.as_u16(), len = body.len(), "relaying buffered response");
            accounting.submit(body.clone());
            build_response(status, headers, Body::from(body))
        }
        Err(e) => accounting.fail(GatewayError::UpstreamRead(e.to_string())),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Re-chunk `upstream` into pieces of at most [`RELAY_CHUNK_SIZE`] bytes,
/// capturing each one. A read error ends the body early.
pub fn relay_stream<S, E>(
    upstream: S,
    accounting: Accounting,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut upstream = Box::pin(upstream);
    let mut capture = CaptureGuard::new(accounting);
    async_stream::stream! {
        while let Some(next) = upstream.next().await {
            match next {
                Ok(mut data) => {
                    while !data.is_empty() {
                        let chunk = data.split_to(data.len().min(RELAY_CHUNK_SIZE));
                        capture.push(&chunk);
                        yield Ok(chunk);
                    }
                }
                Err(e) => {
                    warn!(error = %e, captured = capture.len(), "error reading streamed response");
                    break;
                }
            }
        }
        capture.finish();
    }
}

/// Accumulates relayed bytes and submits them exactly once, on `finish` or
/// on drop.
struct CaptureGuard {
    accounting: Option<Accounting>,
    buffer: BytesMut,
}

impl CaptureGuard {
    fn new(accounting: Accounting) -> Self {
        Self {
            accounting: Some(accounting),
            buffer: BytesMut::new(),
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn finish(&mut self) {
        if let Some(accounting) = self.accounting.take() {
            accounting.submit(self.buffer.split().freeze());
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if self.accounting.is_some() {
            debug!(captured = self.buffer.len(), "stream dropped before completion");
            self.finish();
        }
    }
}
