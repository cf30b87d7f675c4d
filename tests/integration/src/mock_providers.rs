//! Mock LLM providers for integration testing
//!
//! Wiremock servers standing in for provider endpoints.

use crate::fixtures::{anthropic_json_response, openai_json_response, sse_stream};
use serde_json::Value;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Mock provider API server
pub struct MockProvider {
    /// Underlying wiremock server
    pub server: MockServer,
}

impl MockProvider {
    /// Create a new mock provider server
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Successful chat completion, only when the upstream credential matches
    pub async fn mock_chat_completion(&self, model: &str, token: &str, prompt: u64, completion: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-request-id", "req-upstream-1")
                    .set_body_json(openai_json_response(model, "Hi there!", prompt, completion)),
            )
            .mount(&self.server)
            .await;
    }

    /// Successful Anthropic messages call
    pub async fn mock_anthropic_message(&self, model: &str, input: u64, output: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(anthropic_json_response(model, "Hello!", input, output)),
            )
            .mount(&self.server)
            .await;
    }

    /// Event-stream response carrying `fragments`
    pub async fn mock_streaming(&self, model: &str, fragments: &[&str]) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse_stream(model, fragments), "text/event-stream"),
            )
            .mount(&self.server)
            .await;
    }

    /// Gzip-encoded chat completion
    pub async fn mock_gzip_completion(&self, model: &str, prompt: u64, completion: u64) {
        let json = openai_json_response(model, "Compressed", prompt, completion).to_string();
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(json.as_bytes()).expect("gzip write");
        let body = encoder.finish().expect("gzip finish");

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-encoding", "gzip")
                    .set_body_raw(body, "application/json"),
            )
            .mount(&self.server)
            .await;
    }

    /// Fixed status and JSON body on every call
    pub async fn mock_status(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// `failures` responses with status 503, then success
    pub async fn mock_failures_then_success(&self, model: &str, failures: usize) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(FlakyResponder {
                calls: calls.clone(),
                failures,
                success: openai_json_response(model, "Recovered", 5, 5),
            })
            .mount(&self.server)
            .await;
        calls
    }

    /// Successful response after `delay`
    pub async fn mock_delayed(&self, model: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(openai_json_response(model, "Slow", 1, 1))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }
}

struct FlakyResponder {
    calls: Arc<AtomicUsize>,
    failures: usize,
    success: Value,
}

impl Respond for FlakyResponder {
    fn respond(&self, _: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": { "message": "overloaded", "type": "server_error" }
            }))
        } else {
            ResponseTemplate::new(200).set_body_json(self.success.clone())
        }
    }
}
