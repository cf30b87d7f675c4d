//! Usage accounting end to end.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_usage_row_priced_and_quota_charged() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 12, 8).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    store.set_pricing("mdl-gpt-4", standard_pricing());
    let server = TestServer::start(test_config(), store.clone()).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;
    assert_status(&response, 200);

    let rows = server.wait_for_usage(1).await;
    let row = &rows[0];
    assert_eq!(row.org_id, ORG_ID);
    assert_eq!(row.key_id, KEY_ID);
    assert_eq!(row.model_id, "mdl-gpt-4");
    assert_eq!(row.provider, "openai");
    assert_eq!(row.endpoint, "/v1/chat/completions");
    assert_eq!(row.request_id.as_deref(), Some("req-upstream-1"));
    assert_eq!(row.response_status, 200);
    assert!(row.response_time_ms.is_some());
    assert_eq!((row.usage.prompt_tokens, row.usage.completion_tokens), (12, 8));
    assert!((row.cost_usd.unwrap() - 0.000_36).abs() < 1e-9);
    assert_eq!(row.metadata["extraction_type"], "standard");
    assert_eq!(row.metadata["provider"], "openai");

    let charged = wait_for(
        || {
            let store = store.clone();
            async move { store.used_tokens(ORG_ID) == 20 }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(charged);
}

#[tokio::test]
async fn test_compressed_response_relayed_verbatim_and_counted() {
    let provider = MockProvider::new().await;
    provider.mock_gzip_completion("gpt-4", 30, 10).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;

    assert_status(&response, 200);
    assert_eq!(response.headers()["content-encoding"], "gzip");
    let rows = server.wait_for_usage(1).await;
    assert_eq!(rows[0].usage.total_tokens, 40);
}

#[tokio::test]
async fn test_unreachable_call_recorded_without_tokens() {
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", "http://127.0.0.1:1")]));
    let server = TestServer::start(test_config(), store.clone()).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;
    assert_status(&response, 502);

    let rows = server.wait_for_usage(1).await;
    assert_eq!(rows[0].response_status, 502);
    assert!(rows[0].usage.is_empty());
    assert_eq!(rows[0].cost_usd, Some(0.0));
    assert_eq!(rows[0].metadata["extraction_type"], "none");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.used_tokens(ORG_ID), 0);
}

#[tokio::test]
async fn test_failed_insert_retried() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 2, 2).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    store.fail_next_inserts(2);
    let server = TestServer::start(test_config(), store).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;
    assert_status(&response, 200);

    let rows = server.wait_for_usage(1).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].retry_count, 2);
}

#[tokio::test]
async fn test_disabled_tracking_writes_nothing() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 2, 2).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let mut config = test_config();
    config.usage.enabled = false;
    let server = TestServer::start(config, store.clone()).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;
    assert_status(&response, 200);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(store.usage_logs().is_empty());
}

#[tokio::test]
async fn test_fallback_cost_without_pricing() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 600, 400).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;
    assert_status(&response, 200);

    let rows = server.wait_for_usage(1).await;
    // 1000 tokens at $0.002 per thousand
    assert!((rows[0].cost_usd.unwrap() - 0.002).abs() < 1e-9);
}

#[tokio::test]
async fn test_shutdown_drains_queued_usage() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 1, 1).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store.clone()).await;

    for _ in 0..5 {
        let response = server
            .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
            .await;
        assert_status(&response, 200);
    }

    server.state.stop_background().await;
    assert_eq!(store.usage_logs().len(), 5);
}

#[tokio::test]
async fn test_storage_outage_does_not_affect_callers() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 1, 1).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store.clone()).await;

    // Usage writes start failing after the first row.
    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;
    assert_status(&response, 200);
    server.wait_for_usage(1).await;

    store.fail_next_inserts(100);
    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;
    assert_status(&response, 200);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["choices"][0]["message"]["content"], json!("Hi there!"));
}
