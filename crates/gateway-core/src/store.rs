//! Storage traits consumed by the pipeline.
//!
//! The PostgreSQL implementation lives in `gateway-store`; tests provide
//! in-memory implementations.

use crate::error::StoreError;
use crate::model::{AccessibleModel, CatalogModel, ModelPricing};
use crate::usage::UsageLogJob;
use async_trait::async_trait;
use std::collections::HashMap;

/// An active API key resolved from its raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    /// Storage id of the key
    pub key_id: String,
    /// Owning organization
    pub org_id: String,
}

/// API key lookups and bookkeeping.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Find an active key by its raw value.
    async fn find_active_key(&self, raw_key: &str) -> Result<Option<ApiKeyRecord>, StoreError>;

    /// Stamp the key's last-used time.
    async fn touch_last_used(&self, key_id: &str) -> Result<(), StoreError>;
}

/// Model grants, catalog and pricing.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Active models granted to one organization, ordered by name.
    async fn accessible_models(&self, org_id: &str) -> Result<Vec<AccessibleModel>, StoreError>;

    /// Every active grant, keyed by organization.
    async fn all_grants(&self) -> Result<HashMap<String, Vec<AccessibleModel>>, StoreError>;

    /// The active model catalog.
    async fn active_catalog(&self) -> Result<Vec<CatalogModel>, StoreError>;

    /// Stored pricing for a model, `None` if the model does not exist.
    async fn model_pricing(&self, model_id: &str) -> Result<Option<ModelPricing>, StoreError>;
}

/// Usage persistence.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Write one usage-log row.
    async fn insert_usage_log(&self, job: &UsageLogJob) -> Result<(), StoreError>;

    /// Add to the organization's used-token counter.
    async fn increment_used_tokens(&self, org_id: &str, tokens: u64) -> Result<(), StoreError>;
}

/// Everything the gateway needs from storage.
pub trait GatewayStore: KeyStore + ModelStore + UsageStore {}

impl<T> GatewayStore for T where T: KeyStore + ModelStore + UsageStore {}
