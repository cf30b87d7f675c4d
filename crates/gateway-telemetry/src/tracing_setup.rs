//! Logging and tracing setup.
//!
//! Installs a `tracing-subscriber` registry with an env filter, a text or
//! JSON formatter and, when enabled, an OpenTelemetry layer.

use gateway_config::{LogFormat, TelemetrySettings};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::{
    trace::{Config, RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Output format
    pub log_format: LogFormat,
    /// Install the OpenTelemetry layer
    pub otel_enabled: bool,
    /// Sampling rate (0.0 - 1.0)
    pub sampling_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from(&TelemetrySettings::default())
    }
}

impl From<&TelemetrySettings> for TelemetryConfig {
    fn from(settings: &TelemetrySettings) -> Self {
        Self {
            service_name: settings.service_name.clone(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: settings.log_level.clone(),
            log_format: settings.log_format,
            otel_enabled: settings.otel_enabled,
            sampling_rate: settings.otel_sampling_rate.clamp(0.0, 1.0),
        }
    }
}

impl TelemetryConfig {
    /// Set the sampling rate
    #[must_use]
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn sampler(&self) -> Sampler {
        if self.sampling_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.sampling_rate <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.sampling_rate)
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize the global subscriber.
///
/// Returns the tracer provider when OpenTelemetry is enabled so the caller
/// can shut it down.
pub fn init_tracing(config: &TelemetryConfig) -> Result<Option<TracerProvider>, TracingError> {
    let provider = config.otel_enabled.then(|| {
        let resource = Resource::new(vec![
            opentelemetry::KeyValue::new("service.name", config.service_name.clone()),
            opentelemetry::KeyValue::new("service.version", config.service_version.clone()),
        ]);

        TracerProvider::builder()
            .with_config(
                Config::default()
                    .with_sampler(config.sampler())
                    .with_id_generator(RandomIdGenerator::default())
                    .with_resource(resource),
            )
            .build()
    });

    let otel_layer = provider.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer(config.service_name.clone()))
    });

    let (text_layer, json_layer) = match config.log_format {
        LogFormat::Text => (Some(fmt::layer().with_target(true)), None),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(otel_layer)
        .with(text_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| TracingError::Init(e.to_string()))?;

    info!(
        service = %config.service_name,
        format = ?config.log_format,
        otel = config.otel_enabled,
        sampling_rate = config.sampling_rate,
        "tracing initialized"
    );

    Ok(provider)
}

/// Shut down the tracer provider, flushing remaining spans.
pub fn shutdown_tracing(provider: Option<TracerProvider>) {
    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "tracer provider shutdown failed");
        }
    }
}

/// Tracing initialization error
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    /// A global subscriber is already installed or setup failed
    #[error("failed to initialize tracing: {0}")]
    Init(String),
}
