//! Token counting for streamed responses that carry no usage object.

use gateway_core::{GatewayError, TokenUsage};
use once_cell::sync::Lazy;
use serde_json::Value;
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

// Loading a BPE table takes a while, so each encoding is built once. A
// failed load leaves `None` and counting degrades to the length estimate.
static CL100K: Lazy<Option<CoreBPE>> = Lazy::new(|| {
    tiktoken_rs::cl100k_base()
        .map_err(|e| warn!(error = %e, "failed to load cl100k_base encoding"))
        .ok()
});

static P50K: Lazy<Option<CoreBPE>> = Lazy::new(|| {
    tiktoken_rs::p50k_base()
        .map_err(|e| warn!(error = %e, "failed to load p50k_base encoding"))
        .ok()
});

const CHARS_PER_TOKEN: usize = 4;
const DONE_MARKER: &str = "[DONE]";

/// BPE encoding used for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// GPT-4 / GPT-3.5 family, and the default
    Cl100kBase,
    /// Davinci completion and code models
    P50kBase,
}

impl Encoding {
    /// Pick the encoding for a model name.
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        let model = model.to_ascii_lowercase();
        if model.starts_with("text-davinci-003")
            || model.starts_with("text-davinci-002")
            || model.contains("code")
        {
            Self::P50kBase
        } else {
            Self::Cl100kBase
        }
    }

    fn bpe(self) -> Option<&'static CoreBPE> {
        match self {
            Self::Cl100kBase => CL100K.as_ref(),
            Self::P50kBase => P50K.as_ref(),
        }
    }
}

/// Load the encodings ahead of the first streamed response.
pub fn preload() {
    Lazy::force(&CL100K);
    Lazy::force(&P50K);
}

/// Count tokens in `text`, estimating four characters per token when the
/// encoding is unavailable.
#[must_use]
pub fn count_tokens(text: &str, encoding: Encoding) -> u64 {
    if text.is_empty() {
        return 0;
    }
    let count = match encoding.bpe() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.len() / CHARS_PER_TOKEN,
    };
    count as u64
}

/// Rebuild the prompt text from a request body.
///
/// Chat requests yield one `role: content` line per message; completion
/// requests yield the `prompt` string.
pub fn prompt_text(request_body: &[u8]) -> Result<String, GatewayError> {
    let json: Value = serde_json::from_slice(request_body).map_err(|e| {
        GatewayError::UsageExtraction(format!("request body is not valid JSON: {e}"))
    })?;

    if let Some(messages) = json.get("messages").and_then(Value::as_array) {
        let mut prompt = String::new();
        for message in messages {
            let role = message.get("role").and_then(Value::as_str).unwrap_or_default();
            let content = message.get("content").map(content_text).unwrap_or_default();
            prompt.push_str(role);
            prompt.push_str(": ");
            prompt.push_str(&content);
            prompt.push('\n');
        }
        return Ok(prompt);
    }

    json.get("prompt")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            GatewayError::UsageExtraction("no messages or prompt found in request".to_string())
        })
}

// Message content is either a string or an array of typed parts.
fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

/// Concatenate the completion fragments carried by server-push frames.
#[must_use]
pub fn completion_text(stream_body: &[u8]) -> String {
    let text = String::from_utf8_lossy(stream_body);
    let mut completion = String::new();

    for line in text.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == DONE_MARKER {
            continue;
        }
        let Ok(frame) = serde_json::from_str::<Value>(data) else {
            debug!("skipping unparseable stream frame");
            continue;
        };

        if let Some(choice) = frame.pointer("/choices/0") {
            if let Some(content) = choice.pointer("/delta/content").and_then(Value::as_str) {
                completion.push_str(content);
            }
            if let Some(text) = choice.get("text").and_then(Value::as_str) {
                completion.push_str(text);
            }
        }
        if let Some(text) = frame.pointer("/delta/text").and_then(Value::as_str) {
            completion.push_str(text);
        }
    }

    completion
}

/// Count prompt and completion tokens for a streamed exchange.
pub fn count_stream_usage(
    request_body: &[u8],
    stream_body: &[u8],
    model: &str,
) -> Result<TokenUsage, GatewayError> {
    let encoding = Encoding::for_model(model);
    let prompt = prompt_text(request_body)?;
    let completion = completion_text(stream_body);

    let usage = TokenUsage::new(
        count_tokens(&prompt, encoding),
        count_tokens(&completion, encoding),
    );
    debug!(
        model,
        ?encoding,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        "counted streamed usage"
    );
    Ok(usage)
}
