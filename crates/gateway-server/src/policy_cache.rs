//! Per-organization model access cache.
//!
//! Readers take a shared lock and clone an `Arc` to the organization's
//! model list. A reload builds a complete new map from storage and swaps it
//! in under the exclusive lock, so readers never see a partial reload.
//! Misses that arrive while a reload is running wait for it instead of
//! starting their own.

use chrono::{DateTime, Utc};
use gateway_core::{AccessibleModel, ModelStore, StoreError};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

type ModelList = Arc<[AccessibleModel]>;

#[derive(Default)]
struct Snapshot {
    models: Arc<HashMap<String, ModelList>>,
    loaded: bool,
    loaded_at: Option<DateTime<Utc>>,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct PolicyCacheStats {
    /// Whether a full load has completed since the last invalidation
    pub loaded: bool,
    /// Organizations with at least one grant
    pub organizations: usize,
    /// Organizations cached with no grants
    pub empty_organizations: usize,
    /// Grants across all organizations
    pub grants: usize,
    /// Time of the last full load
    pub loaded_at: Option<DateTime<Utc>>,
}

/// Organization → accessible models, refreshed from storage.
pub struct AccessPolicyCache {
    store: Arc<dyn ModelStore>,
    snapshot: RwLock<Snapshot>,
    reload_gate: Mutex<()>,
    reload_attempts: AtomicU64,
}

impl std::fmt::Debug for AccessPolicyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessPolicyCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl AccessPolicyCache {
    /// Create an unloaded cache.
    pub fn new(store: Arc<dyn ModelStore>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Snapshot::default()),
            reload_gate: Mutex::new(()),
            reload_attempts: AtomicU64::new(0),
        }
    }

    /// Cached models for `org_id`.
    ///
    /// `None` when the cache is unloaded or the organization has no entry.
    pub fn get(&self, org_id: &str) -> Option<ModelList> {
        let snapshot = self.snapshot.read();
        if !snapshot.loaded {
            return None;
        }
        snapshot.models.get(org_id).cloned()
    }

    /// Whether a full load is in place.
    pub fn is_loaded(&self) -> bool {
        self.snapshot.read().loaded
    }

    /// Replace the whole cache with every active grant in storage.
    ///
    /// On error the previous snapshot is kept. Returns the number of
    /// organizations loaded.
    #[instrument(skip(self))]
    pub async fn reload_all(&self) -> Result<usize, StoreError> {
        let _gate = self.reload_gate.lock().await;
        self.reload_locked().await
    }

    async fn reload_locked(&self) -> Result<usize, StoreError> {
        let result = self.store.all_grants().await;
        self.reload_attempts.fetch_add(1, Ordering::SeqCst);
        let grants = result?;
        let models: HashMap<String, ModelList> = grants
            .into_iter()
            .map(|(org, list)| (org, ModelList::from(list)))
            .collect();
        let organizations = models.len();

        *self.snapshot.write() = Snapshot {
            models: Arc::new(models),
            loaded: true,
            loaded_at: Some(Utc::now()),
        };
        info!(organizations, "access policy cache reloaded");
        Ok(organizations)
    }

    /// Drop every entry and mark the cache unloaded.
    pub fn invalidate(&self) {
        *self.snapshot.write() = Snapshot::default();
        debug!("access policy cache invalidated");
    }

    /// Drop one organization's entry.
    pub fn invalidate_org(&self, org_id: &str) {
        let mut snapshot = self.snapshot.write();
        if snapshot.models.contains_key(org_id) {
            let mut models = HashMap::clone(&snapshot.models);
            models.remove(org_id);
            snapshot.models = Arc::new(models);
        }
        debug!(org_id, "access policy cache entry invalidated");
    }

    /// Models for `org_id`: cache, then one reload and retry, then a direct
    /// query.
    ///
    /// A miss that waited on a reload already in flight reuses its result.
    /// A direct-query answer, empty or not, is cached until the next reload
    /// or invalidation.
    pub async fn resolve(&self, org_id: &str) -> Result<ModelList, StoreError> {
        if let Some(models) = self.get(org_id) {
            return Ok(models);
        }

        let seen = self.reload_attempts.load(Ordering::SeqCst);
        {
            let _gate = self.reload_gate.lock().await;
            if self.reload_attempts.load(Ordering::SeqCst) == seen {
                if let Err(e) = self.reload_locked().await {
                    warn!(org_id, error = %e, "policy cache reload failed, querying directly");
                }
            }
        }
        if let Some(models) = self.get(org_id) {
            return Ok(models);
        }

        let models = ModelList::from(self.store.accessible_models(org_id).await?);
        debug!(org_id, models = models.len(), "resolved models by direct query");
        self.remember(org_id, models.clone());
        Ok(models)
    }

    fn remember(&self, org_id: &str, models: ModelList) {
        let mut snapshot = self.snapshot.write();
        if !snapshot.loaded || snapshot.models.contains_key(org_id) {
            return;
        }
        let mut updated = HashMap::clone(&snapshot.models);
        updated.insert(org_id.to_string(), models);
        snapshot.models = Arc::new(updated);
    }

    /// Cache statistics.
    pub fn stats(&self) -> PolicyCacheStats {
        let snapshot = self.snapshot.read();
        let empty_organizations = snapshot.models.values().filter(|m| m.is_empty()).count();
        PolicyCacheStats {
            loaded: snapshot.loaded,
            organizations: snapshot.models.len() - empty_organizations,
            empty_organizations,
            grants: snapshot.models.values().map(|m| m.len()).sum(),
            loaded_at: snapshot.loaded_at,
        }
    }

    /// Reload every `interval` until the returned handle is stopped.
    pub fn spawn_refresher(self: &Arc<Self>, interval: Duration) -> CacheRefresher {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let cache = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = cache.reload_all().await {
                            warn!(error = %e, "periodic policy cache refresh failed, keeping previous snapshot");
                        }
                    }
                }
            }
            debug!("policy cache refresher stopped");
        });

        CacheRefresher {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

/// Handle to the background refresh task.
#[derive(Debug)]
pub struct CacheRefresher {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CacheRefresher {
    /// Stop refreshing and wait for the task to exit.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_core::{CatalogModel, ModelPricing};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct GrantStore {
        grants: Mutex<HashMap<String, Vec<AccessibleModel>>>,
        fail_reload: Mutex<bool>,
        reload_delay: Option<Duration>,
        reloads: AtomicUsize,
        direct_queries: AtomicUsize,
    }

    #[async_trait]
    impl ModelStore for GrantStore {
        async fn accessible_models(&self, org_id: &str) -> Result<Vec<AccessibleModel>, StoreError> {
            self.direct_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.grants.lock().get(org_id).cloned().unwrap_or_default())
        }

        async fn all_grants(&self) -> Result<HashMap<String, Vec<AccessibleModel>>, StoreError> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.reload_delay {
                tokio::time::sleep(delay).await;
            }
            if *self.fail_reload.lock() {
                return Err(StoreError::Connection("down".into()));
            }
            Ok(self.grants.lock().clone())
        }

        async fn active_catalog(&self) -> Result<Vec<CatalogModel>, StoreError> {
            Ok(Vec::new())
        }

        async fn model_pricing(&self, _: &str) -> Result<Option<ModelPricing>, StoreError> {
            Ok(None)
        }
    }

    fn model(id: &str, model_id: &str) -> AccessibleModel {
        AccessibleModel {
            id: id.into(),
            name: model_id.into(),
            model_id: model_id.into(),
            provider: "openai".into(),
            is_active: true,
            api_token: "upstream".into(),
            api_endpoint: "http://upstream".into(),
            timeout_seconds: None,
            max_retries: None,
            retry_delay_ms: None,
            backoff_multiplier: None,
        }
    }

    fn store_with(grants: &[(&str, Vec<AccessibleModel>)]) -> Arc<GrantStore> {
        let store = GrantStore::default();
        *store.grants.lock() = grants
            .iter()
            .map(|(org, models)| ((*org).to_string(), models.clone()))
            .collect();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_get_after_reload_matches_storage() {
        let store = store_with(&[
            ("org-a", vec![model("1", "gpt-4"), model("2", "gpt-3.5-turbo")]),
            ("org-b", vec![model("3", "claude-3")]),
        ]);
        let cache = AccessPolicyCache::new(store.clone());

        assert!(cache.get("org-a").is_none());
        assert_eq!(cache.reload_all().await.unwrap(), 2);

        let a = cache.get("org-a").unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].model_id, "gpt-4");
        assert_eq!(cache.get("org-b").unwrap()[0].model_id, "claude-3");
        assert!(cache.get("org-c").is_none());
        assert_eq!(cache.stats().grants, 3);
    }

    #[tokio::test]
    async fn test_resolve_cold_cache_reloads_once() {
        let store = store_with(&[("org-a", vec![model("1", "gpt-4")])]);
        let cache = AccessPolicyCache::new(store.clone());

        let models = cache.resolve("org-a").await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(store.reloads.load(Ordering::SeqCst), 1);
        assert_eq!(store.direct_queries.load(Ordering::SeqCst), 0);

        cache.resolve("org-a").await.unwrap();
        assert_eq!(store.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_org_falls_back_to_direct_query() {
        let store = store_with(&[("org-a", vec![model("1", "gpt-4")])]);
        let cache = AccessPolicyCache::new(store.clone());
        cache.reload_all().await.unwrap();

        let models = cache.resolve("org-z").await.unwrap();
        assert!(models.is_empty());
        assert_eq!(store.reloads.load(Ordering::SeqCst), 2);
        assert_eq!(store.direct_queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_org_without_grants_cached_after_direct_query() {
        let store = store_with(&[("org-a", vec![model("1", "gpt-4")])]);
        let cache = AccessPolicyCache::new(store.clone());
        cache.reload_all().await.unwrap();

        for _ in 0..3 {
            assert!(cache.resolve("org-empty").await.unwrap().is_empty());
        }

        assert_eq!(store.reloads.load(Ordering::SeqCst), 2);
        assert_eq!(store.direct_queries.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.organizations, 1);
        assert_eq!(stats.empty_organizations, 1);

        // The next full reload forgets the empty entry.
        cache.reload_all().await.unwrap();
        assert!(cache.get("org-empty").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_reload() {
        let store = Arc::new(GrantStore {
            reload_delay: Some(Duration::from_millis(20)),
            ..GrantStore::default()
        });
        store
            .grants
            .lock()
            .insert("org-a".into(), vec![model("1", "gpt-4")]);
        let cache = AccessPolicyCache::new(store.clone());

        let (a, b, c) = tokio::join!(
            cache.resolve("org-a"),
            cache.resolve("org-a"),
            cache.resolve("org-a")
        );

        assert_eq!(a.unwrap().len(), 1);
        assert_eq!(b.unwrap().len(), 1);
        assert_eq!(c.unwrap().len(), 1);
        assert_eq!(store.reloads.load(Ordering::SeqCst), 1);
        assert_eq!(store.direct_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_snapshot_and_queries_directly() {
        let store = store_with(&[("org-a", vec![model("1", "gpt-4")])]);
        let cache = AccessPolicyCache::new(store.clone());
        cache.reload_all().await.unwrap();

        *store.fail_reload.lock() = true;
        assert!(cache.reload_all().await.is_err());
        assert!(cache.get("org-a").is_some());

        cache.invalidate();
        let models = cache.resolve("org-a").await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(store.direct_queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_org() {
        let store = store_with(&[
            ("org-a", vec![model("1", "gpt-4")]),
            ("org-b", vec![model("2", "gpt-4")]),
        ]);
        let cache = AccessPolicyCache::new(store);
        cache.reload_all().await.unwrap();

        let held = cache.get("org-a").unwrap();
        cache.invalidate_org("org-a");

        assert!(cache.get("org-a").is_none());
        assert!(cache.get("org-b").is_some());
        assert!(cache.is_loaded());
        assert_eq!(held.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_marks_unloaded() {
        let store = store_with(&[("org-a", vec![model("1", "gpt-4")])]);
        let cache = AccessPolicyCache::new(store);
        cache.reload_all().await.unwrap();

        cache.invalidate();
        assert!(!cache.is_loaded());
        assert!(cache.get("org-a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresher_picks_up_new_grants() {
        let store = store_with(&[("org-a", vec![model("1", "gpt-4")])]);
        let cache = Arc::new(AccessPolicyCache::new(store.clone()));
        cache.reload_all().await.unwrap();

        let refresher = cache.spawn_refresher(Duration::from_secs(60));
        store
            .grants
            .lock()
            .insert("org-b".into(), vec![model("2", "gpt-4")]);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.get("org-b").is_some());

        refresher.stop().await;
    }
}
