//! Shared application state.

use crate::auth::AuthResolver;
use crate::dispatcher::Dispatcher;
use crate::last_used::LastUsedQueue;
use crate::policy_cache::AccessPolicyCache;
use gateway_config::GatewayConfig;
use gateway_core::{GatewayError, GatewayStore, KeyStore, ModelStore, UsageStore};
use gateway_resilience::{RetryingTransport, TransportConfig};
use gateway_telemetry::{CostCalculator, GatewayMetrics};
use gateway_usage::{UsageTracker, UsageWorkerPool, WorkerPoolConfig};
use std::sync::Arc;
use tracing::info;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<GatewayConfig>,
    /// Caller authentication
    pub auth: Arc<AuthResolver>,
    /// Model catalog and grants
    pub models: Arc<dyn ModelStore>,
    /// Per-organization model grants
    pub policy_cache: Arc<AccessPolicyCache>,
    /// Key last-used stamping
    pub last_used: Arc<LastUsedQueue>,
    /// Outbound request construction
    pub dispatcher: Arc<Dispatcher>,
    /// Outbound HTTP with retry
    pub transport: RetryingTransport,
    /// Usage accounting
    pub tracker: Arc<UsageTracker>,
    /// Prometheus metrics
    pub metrics: GatewayMetrics,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("policy_cache", &self.policy_cache)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Start building state.
    #[must_use]
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    /// Start the usage workers and the last-used worker.
    pub fn start_background(&self) {
        self.tracker.pool().start();
        self.last_used.start();
    }

    /// Drain the last-used queue and the usage pool.
    pub async fn stop_background(&self) {
        self.last_used.stop().await;
        self.tracker.stop().await;
    }
}

/// Builder for [`AppState`].
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<GatewayConfig>,
    keys: Option<Arc<dyn KeyStore>>,
    models: Option<Arc<dyn ModelStore>>,
    usage: Option<Arc<dyn UsageStore>>,
    policy_cache: Option<Arc<AccessPolicyCache>>,
    last_used: Option<Arc<LastUsedQueue>>,
    tracker: Option<Arc<UsageTracker>>,
    transport: Option<RetryingTransport>,
    metrics: Option<GatewayMetrics>,
}

impl AppStateBuilder {
    /// Set the configuration. Defaults apply otherwise.
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use `store` for keys, grants and usage.
    #[must_use]
    pub fn store<S: GatewayStore + 'static>(mut self, store: Arc<S>) -> Self {
        self.keys = Some(store.clone());
        self.models = Some(store.clone());
        self.usage = Some(store);
        self
    }

    /// Use an existing policy cache.
    #[must_use]
    pub fn policy_cache(mut self, cache: Arc<AccessPolicyCache>) -> Self {
        self.policy_cache = Some(cache);
        self
    }

    /// Use an existing last-used queue.
    #[must_use]
    pub fn last_used(mut self, queue: Arc<LastUsedQueue>) -> Self {
        self.last_used = Some(queue);
        self
    }

    /// Use an existing usage tracker.
    #[must_use]
    pub fn tracker(mut self, tracker: Arc<UsageTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Use an existing transport.
    #[must_use]
    pub fn transport(mut self, transport: RetryingTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use an existing metrics registry.
    #[must_use]
    pub fn metrics(mut self, metrics: GatewayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the state. Background workers are not started.
    pub fn build(self) -> Result<AppState, GatewayError> {
        let config = self.config.unwrap_or_default();
        let (Some(keys), Some(models), Some(usage)) = (self.keys, self.models, self.usage) else {
            return Err(GatewayError::configuration("a gateway store is required"));
        };

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => GatewayMetrics::new()
                .map_err(|e| GatewayError::internal(format!("failed to register metrics: {e}")))?,
        };
        let transport = match self.transport {
            Some(transport) => transport,
            None => RetryingTransport::new(&TransportConfig {
                pool_max_idle_per_host: config.upstream.pool_max_idle_per_host,
                pool_idle_timeout: config.upstream.pool_idle_timeout,
            })?,
        };

        let policy_cache = self
            .policy_cache
            .unwrap_or_else(|| Arc::new(AccessPolicyCache::new(Arc::clone(&models))));
        let last_used = self.last_used.unwrap_or_else(|| {
            Arc::new(LastUsedQueue::new(
                Arc::clone(&keys),
                config.auth.last_used_queue_size,
            ))
        });
        let auth = Arc::new(AuthResolver::new(
            keys,
            Arc::clone(&policy_cache),
            Arc::clone(&last_used),
            config.auth.key_prefix.clone(),
        ));

        let tracker = self.tracker.unwrap_or_else(|| {
            let pool = UsageWorkerPool::new(
                WorkerPoolConfig::from(&config.usage),
                usage,
                CostCalculator::new(Arc::clone(&models)),
            )
            .with_metrics(metrics.clone());
            Arc::new(UsageTracker::new(Arc::new(pool)).with_enabled(config.usage.enabled))
        });

        let dispatcher = Arc::new(Dispatcher::new(&config.upstream));
        if dispatcher.uses_dummy_backend() {
            info!(host = ?config.upstream.dummy_backend_host, "dummy backend enabled");
        }

        Ok(AppState {
            config: Arc::new(config),
            auth,
            models,
            policy_cache,
            last_used,
            dispatcher,
            transport,
            tracker,
            metrics,
        })
    }
}
