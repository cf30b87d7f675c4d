//! PostgreSQL implementation of the core storage traits.

use crate::error::store_err;
use async_trait::async_trait;
use gateway_core::{
    AccessibleModel, ApiKeyRecord, CatalogModel, KeyStore, ModelPricing, ModelStore, StoreError,
    UsageLogJob, UsageStore,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, warn};

const MODEL_COLUMNS: &str = "
    m.id::text AS id,
    m.name,
    m.model_id,
    m.provider,
    m.is_active,
    m.api_token,
    m.api_endpoint,
    m.timeout_seconds,
    m.max_retries,
    m.retry_delay_ms,
    m.backoff_multiplier::float8 AS backoff_multiplier";

/// Gateway storage backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgGatewayStore {
    pool: PgPool,
}

impl PgGatewayStore {
    /// Wrap a connected pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn model_from_row(row: &PgRow) -> Result<AccessibleModel, sqlx::Error> {
    Ok(AccessibleModel {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        model_id: row.try_get("model_id")?,
        provider: row.try_get("provider")?,
        is_active: row.try_get("is_active")?,
        api_token: row.try_get("api_token")?,
        api_endpoint: row.try_get("api_endpoint")?,
        timeout_seconds: row.try_get("timeout_seconds")?,
        max_retries: row.try_get("max_retries")?,
        retry_delay_ms: row.try_get("retry_delay_ms")?,
        backoff_multiplier: row.try_get("backoff_multiplier")?,
    })
}

fn saturating_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl KeyStore for PgGatewayStore {
    async fn find_active_key(&self, raw_key: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id::text AS id, organization_id::text AS organization_id
             FROM api_keys
             WHERE api_key = $1 AND is_active = true",
        )
        .bind(raw_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(|row| {
            Ok(ApiKeyRecord {
                key_id: row.try_get("id")?,
                org_id: row.try_get("organization_id")?,
            })
        })
        .transpose()
        .map_err(store_err)
    }

    async fn touch_last_used(&self, key_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE api_keys SET last_used = NOW(), updated_at = NOW() WHERE id = $1::uuid")
            .bind(key_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl ModelStore for PgGatewayStore {
    async fn accessible_models(&self, org_id: &str) -> Result<Vec<AccessibleModel>, StoreError> {
        let sql = format!(
            "SELECT DISTINCT {MODEL_COLUMNS}
             FROM models m
             JOIN model_organization_access moa ON m.id = moa.model_id
             WHERE moa.organization_id = $1::uuid AND m.is_active = true
             ORDER BY m.name"
        );
        let rows = sqlx::query(&sql)
            .bind(org_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let models = rows
            .iter()
            .filter_map(|row| match model_from_row(row) {
                Ok(model) => Some(model),
                Err(e) => {
                    warn!(org_id, error = %e, "skipping undecodable model row");
                    None
                }
            })
            .collect();
        Ok(models)
    }

    async fn all_grants(&self) -> Result<HashMap<String, Vec<AccessibleModel>>, StoreError> {
        let sql = format!(
            "SELECT DISTINCT moa.organization_id::text AS organization_id, {MODEL_COLUMNS}
             FROM models m
             JOIN model_organization_access moa ON m.id = moa.model_id
             WHERE m.is_active = true
             ORDER BY organization_id, m.name"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let mut grants: HashMap<String, Vec<AccessibleModel>> = HashMap::new();
        for row in &rows {
            let org_id: String = match row.try_get("organization_id") {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "skipping grant row without organization");
                    continue;
                }
            };
            match model_from_row(row) {
                Ok(model) => grants.entry(org_id).or_default().push(model),
                Err(e) => warn!(org_id, error = %e, "skipping undecodable model row"),
            }
        }

        debug!(organizations = grants.len(), rows = rows.len(), "loaded grants");
        Ok(grants)
    }

    async fn active_catalog(&self) -> Result<Vec<CatalogModel>, StoreError> {
        let rows = sqlx::query(
            "SELECT model_id, provider, EXTRACT(EPOCH FROM created_at)::bigint AS created_at
             FROM models
             WHERE is_active = true
             ORDER BY model_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                Ok(CatalogModel {
                    model_id: row.try_get("model_id")?,
                    provider: row.try_get("provider")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(store_err)
    }

    async fn model_pricing(&self, model_id: &str) -> Result<Option<ModelPricing>, StoreError> {
        let row = sqlx::query(
            "SELECT input_cost_per_1m::float8 AS input_cost_per_1m,
                    output_cost_per_1m::float8 AS output_cost_per_1m
             FROM models
             WHERE id = $1::uuid",
        )
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(|row| {
            Ok(ModelPricing {
                input_cost_per_1m: row.try_get("input_cost_per_1m")?,
                output_cost_per_1m: row.try_get("output_cost_per_1m")?,
            })
        })
        .transpose()
        .map_err(store_err)
    }
}

#[async_trait]
impl UsageStore for PgGatewayStore {
    async fn insert_usage_log(&self, job: &UsageLogJob) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO usage_logs (
                organization_id, api_key_id, model_id, endpoint,
                prompt_tokens, completion_tokens, total_tokens,
                request_id, response_status, response_time_ms, cost_usd, metadata, created_at
             ) VALUES (
                $1::uuid, $2::uuid, $3::uuid, $4,
                $5, $6, $7,
                $8, $9, $10, $11::float8, $12, $13
             )",
        )
        .bind(&job.org_id)
        .bind(&job.key_id)
        .bind(&job.model_id)
        .bind(&job.endpoint)
        .bind(saturating_i32(job.usage.prompt_tokens))
        .bind(saturating_i32(job.usage.completion_tokens))
        .bind(saturating_i32(job.usage.total_tokens))
        .bind(&job.request_id)
        .bind(i32::from(job.response_status))
        .bind(job.response_time_ms.map(saturating_i32))
        .bind(job.cost_usd)
        .bind(&job.metadata)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn increment_used_tokens(&self, org_id: &str, tokens: u64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE organization_quotas
             SET used_tokens = used_tokens + $2, updated_at = NOW()
             WHERE organization_id = $1::uuid",
        )
        .bind(org_id)
        .bind(i64::try_from(tokens).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}
