//! In-memory implementation of the storage traits.
//!
//! Used for local development and tests. Keys are stored by their raw value.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway_core::{
    AccessibleModel, ApiKeyRecord, CatalogModel, KeyStore, ModelPricing, ModelStore, StoreError,
    UsageLogJob, UsageStore,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone)]
struct KeyEntry {
    record: ApiKeyRecord,
    active: bool,
    last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Tables {
    keys: HashMap<String, KeyEntry>,
    grants: HashMap<String, Vec<AccessibleModel>>,
    catalog: Vec<CatalogModel>,
    pricing: HashMap<String, ModelPricing>,
    usage_logs: Vec<UsageLogJob>,
    used_tokens: HashMap<String, u64>,
}

/// Gateway storage held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    failing_inserts: AtomicUsize,
    grant_queries: AtomicUsize,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active API key.
    pub fn insert_key(&self, raw_key: &str, key_id: &str, org_id: &str) {
        self.tables.write().keys.insert(
            raw_key.to_string(),
            KeyEntry {
                record: ApiKeyRecord {
                    key_id: key_id.to_string(),
                    org_id: org_id.to_string(),
                },
                active: true,
                last_used_at: None,
            },
        );
    }

    /// Mark a key inactive.
    pub fn deactivate_key(&self, raw_key: &str) {
        if let Some(entry) = self.tables.write().keys.get_mut(raw_key) {
            entry.active = false;
        }
    }

    /// Grant `model` to `org_id`. Inactive models are stored but never returned.
    pub fn grant(&self, org_id: &str, model: AccessibleModel) {
        self.tables
            .write()
            .grants
            .entry(org_id.to_string())
            .or_default()
            .push(model);
    }

    /// Remove every grant of `org_id`.
    pub fn revoke_all(&self, org_id: &str) {
        self.tables.write().grants.remove(org_id);
    }

    /// Add a catalog entry.
    pub fn add_catalog(&self, model: CatalogModel) {
        self.tables.write().catalog.push(model);
    }

    /// Set pricing for a model id.
    pub fn set_pricing(&self, model_id: &str, pricing: ModelPricing) {
        self.tables.write().pricing.insert(model_id.to_string(), pricing);
    }

    /// Make every call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` usage log inserts.
    pub fn fail_next_inserts(&self, n: usize) {
        self.failing_inserts.store(n, Ordering::SeqCst);
    }

    /// Usage rows written so far.
    pub fn usage_logs(&self) -> Vec<UsageLogJob> {
        self.tables.read().usage_logs.clone()
    }

    /// Quota tokens consumed by `org_id`.
    pub fn used_tokens(&self, org_id: &str) -> u64 {
        self.tables.read().used_tokens.get(org_id).copied().unwrap_or(0)
    }

    /// When the key with `key_id` was last stamped.
    pub fn last_used(&self, key_id: &str) -> Option<DateTime<Utc>> {
        self.tables
            .read()
            .keys
            .values()
            .find(|e| e.record.key_id == key_id)
            .and_then(|e| e.last_used_at)
    }

    /// Grant lookups served, per organization or in bulk.
    pub fn grant_queries(&self) -> usize {
        self.grant_queries.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("store unavailable".to_string()));
        }
        Ok(())
    }
}

fn active_only(models: &[AccessibleModel]) -> Vec<AccessibleModel> {
    models.iter().filter(|m| m.is_active).cloned().collect()
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn find_active_key(&self, raw_key: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .keys
            .get(raw_key)
            .filter(|e| e.active)
            .map(|e| e.record.clone()))
    }

    async fn touch_last_used(&self, key_id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let entry = tables
            .keys
            .values_mut()
            .find(|e| e.record.key_id == key_id)
            .ok_or_else(|| StoreError::NotFound(format!("api key {key_id}")))?;
        entry.last_used_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl ModelStore for MemoryStore {
    async fn accessible_models(&self, org_id: &str) -> Result<Vec<AccessibleModel>, StoreError> {
        self.check_available()?;
        self.grant_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tables
            .read()
            .grants
            .get(org_id)
            .map(|m| active_only(m))
            .unwrap_or_default())
    }

    async fn all_grants(&self) -> Result<HashMap<String, Vec<AccessibleModel>>, StoreError> {
        self.check_available()?;
        self.grant_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tables
            .read()
            .grants
            .iter()
            .map(|(org, models)| (org.clone(), active_only(models)))
            .filter(|(_, models)| !models.is_empty())
            .collect())
    }

    async fn active_catalog(&self) -> Result<Vec<CatalogModel>, StoreError> {
        self.check_available()?;
        let mut catalog = self.tables.read().catalog.clone();
        catalog.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(catalog)
    }

    async fn model_pricing(&self, model_id: &str) -> Result<Option<ModelPricing>, StoreError> {
        self.check_available()?;
        Ok(self.tables.read().pricing.get(model_id).copied())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn insert_usage_log(&self, job: &UsageLogJob) -> Result<(), StoreError> {
        self.check_available()?;
        let failing = self
            .failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::query("insert failed"));
        }
        self.tables.write().usage_logs.push(job.clone());
        Ok(())
    }

    async fn increment_used_tokens(&self, org_id: &str, tokens: u64) -> Result<(), StoreError> {
        self.check_available()?;
        *self
            .tables
            .write()
            .used_tokens
            .entry(org_id.to_string())
            .or_default() += tokens;
        Ok(())
    }
}
