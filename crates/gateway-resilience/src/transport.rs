//! Outbound HTTP transport with per-model timeout and retry.

use crate::retry::RetryPolicy;
use bytes::Bytes;
use gateway_core::{GatewayError, ReliabilityPolicy};
use http::{HeaderMap, Method};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Connection pool settings for the shared client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
    /// How long idle connections are kept
    pub pool_idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 100,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// A fully buffered outbound request.
///
/// The body is held in memory so every attempt sends the same bytes.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute target URL
    pub url: String,
    /// Headers to send
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
}

/// Response handed back by [`RetryingTransport::send`].
#[derive(Debug)]
pub struct UpstreamResponse {
    /// The provider response; its body has not been read
    pub response: reqwest::Response,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Wall time from the first attempt until headers arrived
    pub elapsed: Duration,
}

/// Sends requests upstream, retrying 5xx responses and transport errors.
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    client: reqwest::Client,
}

impl RetryingTransport {
    /// Build the shared client.
    ///
    /// Response decompression is disabled so bytes are relayed exactly as
    /// the provider sent them.
    pub fn new(config: &TransportConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .no_gzip()
            .build()
            .map_err(|e| GatewayError::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Use an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Send `request` under `policy`.
    ///
    /// A status below 500 is returned at once. A 5xx or a transport error is
    /// retried; when retries run out the last 5xx is returned unmodified, and
    /// if no attempt produced a response the call fails with
    /// [`GatewayError::UpstreamUnreachable`].
    pub async fn send(
        &self,
        request: &UpstreamRequest,
        policy: &ReliabilityPolicy,
    ) -> Result<UpstreamResponse, GatewayError> {
        let retry = RetryPolicy::from_reliability(policy);
        let started = Instant::now();

        let outcome = retry
            .execute(
                |attempt| {
                    let builder = self
                        .client
                        .request(request.method.clone(), &request.url)
                        .headers(request.headers.clone())
                        .body(request.body.clone())
                        .timeout(policy.timeout);
                    async move {
                        debug!(attempt = attempt + 1, "sending upstream request");
                        builder.send().await
                    }
                },
                |result| match result {
                    Ok(response) => response.status().is_server_error(),
                    Err(_) => true,
                },
            )
            .await;

        let attempts = outcome.attempts;
        match outcome.result {
            Ok(response) => {
                if response.status().is_server_error() {
                    warn!(
                        status = response.status().as_u16(),
                        attempts,
                        "upstream retries exhausted, returning last error response"
                    );
                }
                Ok(UpstreamResponse {
                    response,
                    attempts,
                    elapsed: started.elapsed(),
                })
            }
            Err(e) => {
                warn!(attempts, error = %e, "upstream unreachable");
                Err(GatewayError::UpstreamUnreachable(e.to_string()))
            }
        }
    }
}
