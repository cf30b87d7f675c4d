//! Token usage extraction from provider responses.

use crate::decompress::decompress_if_needed;
use gateway_core::{GatewayError, TokenUsage};
use serde_json::Value;
use tracing::debug;

const MIN_BODY_LEN: usize = 10;
const GENERIC_USAGE_KEYS: [&str; 3] = ["usage", "token_usage", "tokens"];

/// Response shape used to read the usage object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFormat {
    /// `usage.prompt_tokens` / `completion_tokens` / `total_tokens`
    OpenAi,
    /// `usage.input_tokens` / `output_tokens`
    Anthropic,
    /// Best-effort scan of common key names
    Generic,
}

impl ProviderFormat {
    /// Format for a provider name.
    #[must_use]
    pub fn for_provider(provider: &str) -> Self {
        match provider.to_ascii_lowercase().as_str() {
            "openai" => Self::OpenAi,
            "anthropic" => Self::Anthropic,
            _ => Self::Generic,
        }
    }
}

/// Why standard extraction did not produce usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractFailure {
    /// The body is a server-push stream; count tokens instead
    Streaming,
    /// Any other failure
    Invalid(String),
}

impl From<ExtractFailure> for GatewayError {
    fn from(failure: ExtractFailure) -> Self {
        match failure {
            ExtractFailure::Streaming => {
                Self::UsageExtraction("streaming response detected".to_string())
            }
            ExtractFailure::Invalid(msg) => Self::UsageExtraction(msg),
        }
    }
}

impl From<GatewayError> for ExtractFailure {
    fn from(err: GatewayError) -> Self {
        Self::Invalid(err.to_string())
    }
}

/// Read the usage triple from a non-streaming response body.
pub fn extract_usage(body: &[u8], provider: &str) -> Result<TokenUsage, ExtractFailure> {
    if body.len() < MIN_BODY_LEN {
        return Err(ExtractFailure::Invalid(
            "response too small to contain usage data".to_string(),
        ));
    }

    let body = decompress_if_needed(body)?;
    let text = String::from_utf8_lossy(&body);
    if text.starts_with("data:") || text.contains("data: ") {
        return Err(ExtractFailure::Streaming);
    }

    let json: Value = serde_json::from_slice(&body).map_err(|e| {
        debug!(len = body.len(), error = %e, "response is not valid JSON");
        ExtractFailure::Invalid(format!("response is not valid JSON (length: {})", body.len()))
    })?;

    let format = ProviderFormat::for_provider(provider);
    let usage = match format {
        ProviderFormat::OpenAi => openai_usage(&json),
        ProviderFormat::Anthropic => anthropic_usage(&json),
        ProviderFormat::Generic => generic_usage(&json),
    };

    usage.filter(|u| !u.is_empty()).ok_or_else(|| {
        ExtractFailure::Invalid(format!("no usage data found in {provider} response"))
    })
}

fn counter(object: &Value, key: &str) -> u64 {
    object.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn openai_usage(json: &Value) -> Option<TokenUsage> {
    let usage = json.get("usage")?;
    Some(TokenUsage {
        prompt_tokens: counter(usage, "prompt_tokens"),
        completion_tokens: counter(usage, "completion_tokens"),
        total_tokens: counter(usage, "total_tokens"),
    })
}

fn anthropic_usage(json: &Value) -> Option<TokenUsage> {
    let usage = json.get("usage")?;
    Some(TokenUsage::new(
        counter(usage, "input_tokens"),
        counter(usage, "output_tokens"),
    ))
}

fn generic_usage(json: &Value) -> Option<TokenUsage> {
    GENERIC_USAGE_KEYS.iter().find_map(|key| {
        let usage = json.get(*key)?.as_object()?;
        let object = Value::Object(usage.clone());
        let prompt = counter(&object, "prompt_tokens");
        let completion = counter(&object, "completion_tokens");
        let mut total = counter(&object, "total_tokens");
        if total == 0 {
            total = prompt + completion;
        }
        (total > 0).then_some(TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
        })
    })
}
