//! Access policy cache freshness and hit behaviour.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use std::sync::Arc;

#[tokio::test]
async fn test_cold_cache_loads_on_first_request() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 1, 1).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store.clone()).await;
    assert!(!server.state.policy_cache.is_loaded());

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;

    assert_status(&response, 200);
    assert!(server.state.policy_cache.is_loaded());
    assert_eq!(server.state.policy_cache.stats().grants, 1);
}

#[tokio::test]
async fn test_repeat_requests_served_from_cache() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 1, 1).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store.clone()).await;

    for _ in 0..3 {
        let response = server
            .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
            .await;
        assert_status(&response, 200);
    }

    assert_eq!(store.grant_queries(), 1);
}

#[tokio::test]
async fn test_new_grant_visible_after_reload() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 1, 1).await;
    provider.mock_anthropic_message("claude-3-opus", 4, 2).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store.clone()).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;
    assert_status(&response, 200);

    store.grant(ORG_ID, model("claude-3-opus", "anthropic", &provider.url()));

    // Stale until the cache is refreshed.
    let response = server
        .post_json("/v1/messages", API_KEY, &chat_body("claude-3-opus"))
        .await;
    assert_status(&response, 403);

    server.state.policy_cache.reload_all().await.unwrap();

    let response = server
        .post_json("/v1/messages", API_KEY, &chat_body("claude-3-opus"))
        .await;
    assert_status(&response, 200);
}

#[tokio::test]
async fn test_org_invalidation_picks_up_changes() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 1, 1).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store.clone()).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;
    assert_status(&response, 200);

    store.grant(ORG_ID, model("gpt-4o", "openai", &provider.url()));
    server.state.policy_cache.invalidate_org(ORG_ID);

    let response = server.get_with_key("/v1/models", API_KEY).await;
    assert_status(&response, 200);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_revoked_grants_denied_after_reload() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 1, 1).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store.clone()).await;

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;
    assert_status(&response, 200);

    store.revoke_all(ORG_ID);
    server.state.policy_cache.reload_all().await.unwrap();

    let response = server
        .post_json("/v1/chat/completions", API_KEY, &chat_body("gpt-4"))
        .await;
    assert_status(&response, 403);
    assert_eq!(provider.requests().await.len(), 1);
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_snapshot() {
    let provider = MockProvider::new().await;
    provider.mock_chat_completion("gpt-4", "openai-upstream-token", 1, 1).await;
    let store = Arc::new(seeded_store(vec![model("gpt-4", "openai", &provider.url())]));
    let server = TestServer::start(test_config(), store.clone()).await;
    server.state.policy_cache.reload_all().await.unwrap();

    store.set_unavailable(true);
    assert!(server.state.policy_cache.reload_all().await.is_err());
    assert!(server.state.policy_cache.get(ORG_ID).is_some());
    assert_eq!(server.state.policy_cache.stats().grants, 1);
}
