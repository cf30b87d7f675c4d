//! Prometheus metrics for the gateway.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metrics error
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Registration or encoding failed
    #[error("metrics error: {0}")]
    Prometheus(#[from] prometheus::Error),
    /// Encoded output was not UTF-8
    #[error("metrics output is not valid UTF-8")]
    Encoding,
}

/// Outcome label for usage jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageJobOutcome {
    /// Accepted by the queue
    Queued,
    /// Rejected because the queue was full or stopped
    Dropped,
}

impl UsageJobOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Dropped => "dropped",
        }
    }
}

/// Gateway metrics backed by a dedicated registry.
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    upstream_duration: HistogramVec,
    upstream_retries: IntCounter,
    usage_jobs: IntCounterVec,
    usage_queue_depth: IntGauge,
}

impl std::fmt::Debug for GatewayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayMetrics").finish_non_exhaustive()
    }
}

impl GatewayMetrics {
    /// Create and register every metric.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Proxied requests by response status"),
            &["status"],
        )?;
        let upstream_duration = HistogramVec::new(
            HistogramOpts::new(
                "gateway_upstream_duration_seconds",
                "Time until upstream response headers, including retries",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["provider"],
        )?;
        let upstream_retries = IntCounter::new(
            "gateway_upstream_retries_total",
            "Upstream attempts beyond the first",
        )?;
        let usage_jobs = IntCounterVec::new(
            Opts::new("gateway_usage_jobs_total", "Usage jobs by submission outcome"),
            &["outcome"],
        )?;
        let usage_queue_depth =
            IntGauge::new("gateway_usage_queue_depth", "Usage jobs waiting in the queue")?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(upstream_duration.clone()))?;
        registry.register(Box::new(upstream_retries.clone()))?;
        registry.register(Box::new(usage_jobs.clone()))?;
        registry.register(Box::new(usage_queue_depth.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            upstream_duration,
            upstream_retries,
            usage_jobs,
            usage_queue_depth,
        })
    }

    /// Count a proxied request.
    pub fn record_request(&self, status: u16) {
        self.requests_total
            .with_label_values(&[&status.to_string()])
            .inc();
    }

    /// Record an upstream call.
    pub fn record_upstream(&self, provider: &str, elapsed: Duration, retries: u32) {
        self.upstream_duration
            .with_label_values(&[provider])
            .observe(elapsed.as_secs_f64());
        if retries > 0 {
            self.upstream_retries.inc_by(u64::from(retries));
        }
    }

    /// Count a usage job submission.
    pub fn record_usage_job(&self, outcome: UsageJobOutcome) {
        self.usage_jobs.with_label_values(&[outcome.as_str()]).inc();
    }

    /// Set the current usage queue depth.
    pub fn set_usage_queue_depth(&self, depth: usize) {
        self.usage_queue_depth
            .set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    /// Render the text exposition format.
    pub fn gather(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|_| MetricsError::Encoding)
    }
}
