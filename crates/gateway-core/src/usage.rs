//! Token usage and the usage-log job consumed by the worker pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prompt/completion/total token counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u64,
    /// Tokens in the completion
    pub completion_tokens: u64,
    /// Total tokens
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Create usage from its parts; the total is their sum.
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// True when every counter is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens == 0
    }
}

/// One accounting unit produced per proxied call.
#[derive(Debug, Clone, Serialize)]
pub struct UsageLogJob {
    /// Organization id
    pub org_id: String,
    /// API key id
    pub key_id: String,
    /// Storage id of the accessible model
    pub model_id: String,
    /// Provider name
    pub provider: String,
    /// Request path
    pub endpoint: String,
    /// Upstream request id, if the provider sent one
    pub request_id: Option<String>,
    /// Status returned to the caller
    pub response_status: u16,
    /// Upstream latency in milliseconds
    pub response_time_ms: Option<u64>,
    /// Extracted usage
    pub usage: TokenUsage,
    /// Computed cost in USD
    pub cost_usd: Option<f64>,
    /// Free-form metadata
    pub metadata: serde_json::Value,
    /// Persistence attempts already made
    pub retry_count: u32,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}
