//! API endpoint integration tests
//!
//! Authentication, model listing and the operational endpoints.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_missing_key_rejected() {
    let server = TestServer::with_default_config().await;

    let response = server
        .client
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body("gpt-4"))
        .send()
        .await
        .unwrap();

    assert_status(&response, 401);
    let body = TestServer::json_body(response).await;
    assert_eq!(body, json!({ "error": "Missing or invalid authorization token" }));
}

#[tokio::test]
async fn test_unknown_key_rejected() {
    let server = TestServer::with_default_config().await;

    let response = server
        .post_json("/v1/chat/completions", &random_api_key(), &chat_body("gpt-4"))
        .await;

    assert_status(&response, 401);
    let body = TestServer::json_body(response).await;
    assert_eq!(body, json!({ "error": "Invalid or inactive API key" }));
}

#[tokio::test]
async fn test_inactive_key_rejected_like_unknown() {
    let store = Arc::new(seeded_store(vec![]));
    store.deactivate_key(API_KEY);
    let server = TestServer::start(test_config(), store).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;

    assert_status(&response, 401);
    let body = TestServer::json_body(response).await;
    assert_eq!(body, json!({ "error": "Invalid or inactive API key" }));
}

#[tokio::test]
async fn test_raw_key_header_accepted() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 3, 4).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store).await;

    let response = server
        .client
        .post(server.url("/v1/chat/completions"))
        .header("authorization", API_KEY)
        .json(&chat_body("gpt-4"))
        .send()
        .await
        .unwrap();

    assert_status(&response, 200);
}

#[tokio::test]
async fn test_ungranted_model_forbidden_without_upstream_call() {
    let provider = MockProvider::new().await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("claude-3-opus"))
        .await;

    assert_status(&response, 403);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["error"]["type"], "access_denied");
    assert!(provider.requests().await.is_empty());
    assert!(server.store.usage_logs().is_empty());
}

#[tokio::test]
async fn test_inactive_grant_is_not_accessible() {
    let provider = MockProvider::new().await;
    let mut retired = model("gpt-3.5-turbo", "openai", &provider.url());
    retired.is_active = false;
    let store = Arc::new(seeded_store(vec![retired]));
    let server = TestServer::start(test_config(), store).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-3.5-turbo"))
        .await;

    assert_status(&response, 403);
}

#[tokio::test]
async fn test_models_authenticated_and_anonymous() {
    let store = Arc::new(seeded_store(vec![
        model("gpt-4", "openai", "http://unused"),
        model("claude-3-opus", "anthropic", "http://unused"),
    ]));
    store.add_catalog(gateway_core::CatalogModel {
        model_id: "mistral-large".into(),
        provider: "mistral".into(),
        created_at: 1_710_000_000,
    });
    let server = TestServer::start(test_config(), store).await;

    let response = server.get_with_key("/v1/models", API_KEY).await;
    assert_status(&response, 200);
    let body = TestServer::json_body(response).await;
    let ids: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["gpt-4", "claude-3-opus"]);
    assert_eq!(body["data"][1]["owned_by"], "anthropic");

    let response = server.get("/models").await;
    assert_status(&response, 200);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["object"], "list");
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_models_with_bad_key_falls_back_to_catalog() {
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", "http://unused")]));
    let server = TestServer::start(test_config(), store).await;

    let response = server.get_with_key("/v1/models", "sk-not-a-key").await;

    assert_status(&response, 200);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["data"][0]["id"], "gpt-4");
    assert_eq!(body["data"][0]["created"], 1_700_000_000);
}

#[tokio::test]
async fn test_usage_stats_endpoint() {
    let server = TestServer::with_default_config().await;

    let response = server.get("/stats/usage").await;

    assert_status(&response, 200);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["enabled"], true);
    assert_eq!(body["worker_count"], 5);
    assert_eq!(body["queue_capacity"], 1000);
}

#[tokio::test]
async fn test_metrics_count_requests() {
    let server = TestServer::with_default_config().await;
    let _ = server
        .post_json("/v1/chat/completions", &random_api_key(), &chat_body("gpt-4"))
        .await;

    let response = server.get("/metrics").await;

    assert_status(&response, 200);
    let text = response.text().await.unwrap();
    assert!(text.contains("gateway_requests_total"));
    assert!(text.contains("status=\"401\""));
}

#[tokio::test]
async fn test_last_used_stamped() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 1, 1).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store.clone()).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;
    assert_status(&response, 200);

    let stamped = wait_for(
        || {
            let store = store.clone();
            async move { store.last_used(KEY_ID).is_some() }
        },
        std::time::Duration::from_secs(5),
    )
    .await;
    assert!(stamped);
}
