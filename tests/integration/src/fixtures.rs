//! Test fixtures and sample data for integration tests

use gateway_core::{AccessibleModel, CatalogModel, ModelPricing};
use gateway_store::MemoryStore;
use serde_json::{json, Value};

/// Organization used by most tests
pub const ORG_ID: &str = "org-acme";
/// Key id of [`API_KEY`]
pub const KEY_ID: &str = "key-acme-1";
/// Active gateway key of [`ORG_ID`]
pub const API_KEY: &str = "sk-acme-live-0001";

/// An active model served from `endpoint`.
pub fn model(model_id: &str, provider: &str, endpoint: &str) -> AccessibleModel {
    AccessibleModel {
        id: format!("mdl-{model_id}"),
        name: model_id.to_string(),
        model_id: model_id.to_string(),
        provider: provider.to_string(),
        is_active: true,
        api_token: format!("{provider}-upstream-token"),
        api_endpoint: endpoint.to_string(),
        timeout_seconds: Some(10),
        max_retries: Some(0),
        retry_delay_ms: Some(100),
        backoff_multiplier: Some(2.0),
    }
}

/// `model` with its own retry settings.
pub fn model_with_retries(
    model_id: &str,
    endpoint: &str,
    max_retries: i32,
    retry_delay_ms: i32,
) -> AccessibleModel {
    AccessibleModel {
        max_retries: Some(max_retries),
        retry_delay_ms: Some(retry_delay_ms),
        ..model(model_id, "openai", endpoint)
    }
}

/// Store with [`API_KEY`] granted `models`.
pub fn seeded_store(models: Vec<AccessibleModel>) -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_key(API_KEY, KEY_ID, ORG_ID);
    for model in models {
        store.add_catalog(CatalogModel {
            model_id: model.model_id.clone(),
            provider: model.provider.clone(),
            created_at: 1_700_000_000,
        });
        store.grant(ORG_ID, model);
    }
    store
}

/// Pricing of $10 / $30 per million tokens.
pub fn standard_pricing() -> ModelPricing {
    ModelPricing {
        input_cost_per_1m: Some(10.0),
        output_cost_per_1m: Some(30.0),
    }
}

/// A chat completion request body.
pub fn chat_body(model: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": "You are a helpful assistant." },
            { "role": "user", "content": "Hello, how are you?" }
        ]
    })
}

/// A streaming chat completion request body.
pub fn streaming_chat_body(model: &str) -> Value {
    let mut body = chat_body(model);
    body["stream"] = json!(true);
    body
}

/// An OpenAI chat completion response.
pub fn openai_json_response(model: &str, content: &str, prompt: u64, completion: u64) -> Value {
    json!({
        "id": "chatcmpl-test123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": prompt,
            "completion_tokens": completion,
            "total_tokens": prompt + completion
        }
    })
}

/// An Anthropic messages response.
pub fn anthropic_json_response(model: &str, content: &str, input: u64, output: u64) -> Value {
    json!({
        "id": "msg_test123",
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": [{ "type": "text", "text": content }],
        "stop_reason": "end_turn",
        "usage": { "input_tokens": input, "output_tokens": output }
    })
}

/// An OpenAI-style event stream carrying `fragments`.
pub fn sse_stream(model: &str, fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let event = json!({
            "id": "chatcmpl-stream",
            "object": "chat.completion.chunk",
            "model": model,
            "choices": [{ "index": 0, "delta": { "content": fragment }, "finish_reason": null }]
        });
        body.push_str(&format!("data: {event}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}
