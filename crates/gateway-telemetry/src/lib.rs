//! # Gateway Telemetry
//!
//! Observability for the RelAI gateway.
//!
//! This crate provides:
//! - Structured logging and optional OpenTelemetry tracing
//! - Prometheus metrics for monitoring
//! - Cost calculation for recorded usage

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cost;
pub mod metrics;
pub mod tracing_setup;

// Re-export main types
pub use cost::{fallback_cost, priced_cost, CostCalculator, FALLBACK_COST_PER_1K};
pub use metrics::{GatewayMetrics, MetricsError, UsageJobOutcome};
pub use tracing_setup::{init_tracing, shutdown_tracing, TelemetryConfig, TracingError};
