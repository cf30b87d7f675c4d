//! Test helper utilities for integration tests

use gateway_config::GatewayConfig;
use gateway_core::UsageLogJob;
use gateway_server::{create_router, AppState};
use gateway_store::MemoryStore;
use once_cell::sync::Lazy;
use reqwest::{Client, Response};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Configuration with short usage retry delays.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.usage.retry_delay = Duration::from_millis(20);
    config.upstream.default_retry_delay = Duration::from_millis(10);
    config
}

/// A running gateway backed by a [`MemoryStore`].
pub struct TestServer {
    /// The server address
    pub addr: SocketAddr,
    /// HTTP client for making requests
    pub client: Client,
    /// Base URL for the server
    pub base_url: String,
    /// Backing store
    pub store: Arc<MemoryStore>,
    /// Gateway state
    pub state: AppState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Start a gateway with `config` over `store`.
    pub async fn start(config: GatewayConfig, store: Arc<MemoryStore>) -> Self {
        init_tracing();
        let state = AppState::builder()
            .config(config)
            .store(store.clone())
            .build()
            .expect("Failed to build state");
        state.start_background();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let router = create_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .no_gzip()
            .build()
            .expect("Failed to create client");

        Self {
            addr,
            client,
            base_url: format!("http://{addr}"),
            store,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Start with the test configuration and an empty store.
    pub async fn with_default_config() -> Self {
        Self::start(test_config(), Arc::new(MemoryStore::new())).await
    }

    /// Get the full URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Request failed")
    }

    /// Make an authenticated GET request
    pub async fn get_with_key(&self, path: &str, key: &str) -> Response {
        self.client
            .get(self.url(path))
            .bearer_auth(key)
            .send()
            .await
            .expect("Request failed")
    }

    /// Make an authenticated POST request with a JSON body
    pub async fn post_json(&self, path: &str, key: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .bearer_auth(key)
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    /// Make a streaming POST request and collect the body chunks
    pub async fn post_streaming(&self, path: &str, key: &str, body: &Value) -> Vec<String> {
        use futures::StreamExt;

        let response = self.post_json(path, key, body).await;
        let mut chunks = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            if let Ok(bytes) = chunk {
                chunks.push(String::from_utf8_lossy(&bytes).into_owned());
            }
        }

        chunks
    }

    /// Parse response body as JSON
    pub async fn json_body(response: Response) -> Value {
        response.json().await.expect("Failed to parse JSON")
    }

    /// Wait until at least `n` usage rows have been written.
    pub async fn wait_for_usage(&self, n: usize) -> Vec<UsageLogJob> {
        let store = self.store.clone();
        let written = wait_for(
            || {
                let store = store.clone();
                async move { store.usage_logs().len() >= n }
            },
            Duration::from_secs(5),
        )
        .await;
        assert!(written, "expected {n} usage rows, found {}", self.store.usage_logs().len());
        self.store.usage_logs()
    }

    /// Shutdown the test server
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Assert that a response has the expected status code
pub fn assert_status(response: &Response, expected: u16) {
    assert_eq!(
        response.status().as_u16(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}

/// Wait for a condition to be true with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Generate a random API key for testing
pub fn random_api_key() -> String {
    format!("sk-test-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_health() {
        let server = TestServer::with_default_config().await;

        let response = server.get("/health").await;
        assert_status(&response, 200);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[test]
    fn test_random_api_key() {
        let key1 = random_api_key();
        let key2 = random_api_key();
        assert!(key1.starts_with("sk-test-"));
        assert_ne!(key1, key2);
    }
}
