//! Turns a captured exchange into a usage job.
//!
//! The request path only enqueues the raw capture; extraction, pricing and
//! persistence run on the worker pool.

use crate::classify::is_streaming;
use crate::extractor::{extract_usage, ExtractFailure};
use crate::tokenizer::count_stream_usage;
use crate::worker_pool::{UsageWorkerPool, WorkerPoolStats};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use gateway_core::{TokenUsage, UsageLogJob};
use gateway_telemetry::CostCalculator;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Everything the relay saw of one proxied call.
#[derive(Debug, Clone)]
pub struct UsageCapture {
    /// Organization id
    pub org_id: String,
    /// API key id
    pub key_id: String,
    /// Storage id of the accessible model
    pub model_id: String,
    /// Upstream model identifier, used to pick a tokenizer
    pub model_name: String,
    /// Provider name
    pub provider: String,
    /// Request path
    pub endpoint: String,
    /// Upstream `X-Request-Id`
    pub request_id: Option<String>,
    /// Status returned to the caller
    pub status: u16,
    /// Time from request start until the relayed body was complete
    pub response_time: Option<Duration>,
    /// Upstream content type
    pub content_type: Option<String>,
    /// Raw inbound request body
    pub request_body: Bytes,
    /// Response bytes relayed to the caller
    pub response_body: Bytes,
}

/// How usage was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionKind {
    /// Read from the provider's usage object
    Standard,
    /// Counted from the prompt and streamed completion
    Tiktoken,
    /// Nothing could be extracted; the call is logged with zero tokens
    Unavailable,
}

impl ExtractionKind {
    /// Label stored in the job metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Tiktoken => "tiktoken",
            Self::Unavailable => "none",
        }
    }
}

/// Extract usage from a capture, choosing between the provider usage object
/// and token counting, and falling back from one to the other.
pub fn extract(capture: &UsageCapture) -> (TokenUsage, ExtractionKind) {
    let streaming = is_streaming(capture.content_type.as_deref(), &capture.response_body);

    let counted = || {
        count_stream_usage(&capture.request_body, &capture.response_body, &capture.model_name)
    };

    if streaming {
        match counted() {
            Ok(usage) => return (usage, ExtractionKind::Tiktoken),
            Err(e) => debug!(error = %e, "token counting failed, trying standard extraction"),
        }
        return match extract_usage(&capture.response_body, &capture.provider) {
            Ok(usage) => (usage, ExtractionKind::Standard),
            Err(e) => {
                warn!(provider = %capture.provider, error = ?e, "both extraction paths failed");
                (TokenUsage::default(), ExtractionKind::Unavailable)
            }
        };
    }

    match extract_usage(&capture.response_body, &capture.provider) {
        Ok(usage) => (usage, ExtractionKind::Standard),
        Err(ExtractFailure::Streaming) => match counted() {
            Ok(usage) => (usage, ExtractionKind::Tiktoken),
            Err(e) => {
                warn!(provider = %capture.provider, error = %e, "token counting failed for stream");
                (TokenUsage::default(), ExtractionKind::Unavailable)
            }
        },
        Err(ExtractFailure::Invalid(reason)) => {
            debug!(provider = %capture.provider, status = capture.status, %reason, "no usage extracted");
            (TokenUsage::default(), ExtractionKind::Unavailable)
        }
    }
}

/// Build the usage job for `capture`.
///
/// Decompression and token counting run on the blocking pool. Returns `None`
/// only if that task panicked.
#[instrument(skip_all, fields(org_id = %capture.org_id, model = %capture.model_name, status = capture.status))]
pub(crate) async fn prepare_job(capture: UsageCapture, cost: &CostCalculator) -> Option<UsageLogJob> {
    let (capture, (usage, kind)) = match tokio::task::spawn_blocking(move || {
        let extracted = extract(&capture);
        (capture, extracted)
    })
    .await
    {
        Ok(done) => done,
        Err(e) => {
            error!(error = %e, "usage extraction task failed, dropping capture");
            return None;
        }
    };

    let cost_usd = if usage.is_empty() {
        0.0
    } else {
        cost.calculate(&capture.model_id, &usage).await
    };

    let metadata = serde_json::json!({
        "provider": capture.provider,
        "model_id": capture.model_id,
        "extraction_type": kind.as_str(),
        "extracted_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    });
    debug!(tokens = usage.total_tokens, cost_usd, extraction = kind.as_str(), "usage extracted");

    Some(UsageLogJob {
        org_id: capture.org_id,
        key_id: capture.key_id,
        model_id: capture.model_id,
        provider: capture.provider,
        endpoint: capture.endpoint,
        request_id: capture.request_id,
        response_status: capture.status,
        response_time_ms: capture.response_time.map(|d| d.as_millis() as u64),
        usage,
        cost_usd: Some(cost_usd),
        metadata,
        retry_count: 0,
        created_at: Utc::now(),
    })
}

/// Tracker statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageTrackerStats {
    /// Whether tracking is enabled
    pub enabled: bool,
    /// Worker pool statistics
    #[serde(flatten)]
    pub pool: WorkerPoolStats,
}

/// Front door of usage accounting: an enable switch over the worker pool.
#[derive(Debug)]
pub struct UsageTracker {
    enabled: AtomicBool,
    pool: Arc<UsageWorkerPool>,
}

impl UsageTracker {
    /// Create an enabled tracker.
    pub fn new(pool: Arc<UsageWorkerPool>) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            pool,
        }
    }

    /// Set the enabled flag.
    #[must_use]
    pub fn with_enabled(self, enabled: bool) -> Self {
        self.set_enabled(enabled);
        self
    }

    /// Enable or disable tracking at runtime.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether tracking is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// The underlying worker pool.
    pub fn pool(&self) -> &Arc<UsageWorkerPool> {
        &self.pool
    }

    /// Queue `capture` for accounting without waiting.
    ///
    /// Returns `false` when tracking is disabled or the queue is full.
    pub fn track(&self, capture: UsageCapture) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.pool.submit(capture)
    }

    /// Tracker and pool statistics.
    pub fn stats(&self) -> UsageTrackerStats {
        UsageTrackerStats {
            enabled: self.is_enabled(),
            pool: self.pool.stats(),
        }
    }

    /// Drain and stop the worker pool.
    pub async fn stop(&self) {
        self.pool.stop().await;
    }
}
