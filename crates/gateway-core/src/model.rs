//! Model types: what an organization may call and how to call it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default upstream timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default delay before the first retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
/// Default backoff multiplier.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Per-organization view of a callable model.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibleModel {
    /// Storage identifier of the model row
    pub id: String,
    /// Display name
    pub name: String,
    /// Upstream model identifier, matched against the request body
    pub model_id: String,
    /// Provider name (openai, anthropic, ...)
    pub provider: String,
    /// Whether the model is active
    pub is_active: bool,
    /// Upstream credential
    #[serde(skip_serializing)]
    pub api_token: String,
    /// Upstream base endpoint
    pub api_endpoint: String,
    /// Timeout override in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,
    /// Retry count override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i32>,
    /// Retry delay override in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<i32>,
    /// Backoff multiplier override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
}

impl AccessibleModel {
    /// Resolve the reliability policy, filling unset fields from `defaults`.
    #[must_use]
    pub fn reliability(&self, defaults: &ReliabilityPolicy) -> ReliabilityPolicy {
        ReliabilityPolicy {
            timeout: self
                .timeout_seconds
                .map_or(defaults.timeout, |s| Duration::from_secs(u64::from(s.max(0) as u32))),
            max_retries: self
                .max_retries
                .map_or(defaults.max_retries, |n| n.max(0) as u32),
            retry_delay: self
                .retry_delay_ms
                .map_or(defaults.retry_delay, |ms| {
                    Duration::from_millis(u64::from(ms.max(0) as u32))
                }),
            backoff_multiplier: self
                .backoff_multiplier
                .filter(|m| m.is_finite() && *m > 0.0)
                .unwrap_or(defaults.backoff_multiplier),
        }
    }
}

impl fmt::Debug for AccessibleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessibleModel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("model_id", &self.model_id)
            .field("provider", &self.provider)
            .field("is_active", &self.is_active)
            .field("api_token", &"[REDACTED]")
            .field("api_endpoint", &self.api_endpoint)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .finish()
    }
}

/// Timeout and retry policy for one upstream model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReliabilityPolicy {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub retry_delay: Duration,
    /// Factor applied to the delay per additional retry
    pub backoff_multiplier: f64,
}

impl Default for ReliabilityPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// Entry of the active model catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogModel {
    /// Upstream model identifier
    pub model_id: String,
    /// Provider name
    pub provider: String,
    /// Creation time as a unix timestamp
    pub created_at: i64,
}

/// Stored pricing for a model, per million tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Input price per million tokens
    pub input_cost_per_1m: Option<f64>,
    /// Output price per million tokens
    pub output_cost_per_1m: Option<f64>,
}
