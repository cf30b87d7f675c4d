//! Gateway schema migrations.
//!
//! Only the tables the proxy reads or writes are defined here; the
//! administrative surface may add its own columns alongside.

use crate::migration::Migration;

/// All migrations in order.
#[must_use]
pub fn all_migrations() -> Vec<Migration> {
    vec![
        v001_create_organizations(),
        v002_create_api_keys(),
        v003_create_models(),
        v004_create_model_organization_access(),
        v005_create_usage_logs(),
        v006_create_organization_quotas(),
    ]
}

/// V001: organizations.
#[must_use]
pub fn v001_create_organizations() -> Migration {
    Migration::builder(20240601000001, "create_organizations")
        .up(r"
            CREATE EXTENSION IF NOT EXISTS pgcrypto;

            CREATE TABLE IF NOT EXISTS organizations (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                name VARCHAR(255) NOT NULL,
                description TEXT,
                is_active BOOLEAN NOT NULL DEFAULT true,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
        ")
        .tag("core")
        .build()
}

/// V002: API keys, looked up by raw value.
#[must_use]
pub fn v002_create_api_keys() -> Migration {
    Migration::builder(20240601000002, "create_api_keys")
        .up(r"
            CREATE TABLE IF NOT EXISTS api_keys (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
                name VARCHAR(255),
                api_key VARCHAR(255) NOT NULL UNIQUE,
                is_active BOOLEAN NOT NULL DEFAULT true,
                last_used TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_api_keys_active ON api_keys(api_key) WHERE is_active = true;
            CREATE INDEX IF NOT EXISTS idx_api_keys_organization ON api_keys(organization_id);
        ")
        .tag("core")
        .build()
}

/// V003: models with reliability policy and pricing.
#[must_use]
pub fn v003_create_models() -> Migration {
    Migration::builder(20240601000003, "create_models")
        .up(r"
            CREATE TABLE IF NOT EXISTS models (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                name VARCHAR(255) NOT NULL,
                description TEXT,
                provider VARCHAR(100) NOT NULL,
                model_id VARCHAR(255) NOT NULL,
                api_endpoint TEXT NOT NULL DEFAULT '',
                api_token TEXT NOT NULL DEFAULT '',
                timeout_seconds INTEGER CHECK (timeout_seconds BETWEEN 5 AND 300),
                max_retries INTEGER CHECK (max_retries BETWEEN 0 AND 3),
                retry_delay_ms INTEGER CHECK (retry_delay_ms BETWEEN 100 AND 10000),
                backoff_multiplier NUMERIC(4, 2) CHECK (backoff_multiplier BETWEEN 1.0 AND 5.0),
                input_cost_per_1m NUMERIC(12, 6),
                output_cost_per_1m NUMERIC(12, 6),
                is_active BOOLEAN NOT NULL DEFAULT true,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_models_active ON models(is_active);
        ")
        .tag("core")
        .build()
}

/// V004: model grants.
#[must_use]
pub fn v004_create_model_organization_access() -> Migration {
    Migration::builder(20240601000004, "create_model_organization_access")
        .up(r"
            CREATE TABLE IF NOT EXISTS model_organization_access (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                model_id UUID NOT NULL REFERENCES models(id) ON DELETE CASCADE,
                organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (model_id, organization_id)
            );

            CREATE INDEX IF NOT EXISTS idx_moa_organization ON model_organization_access(organization_id);
        ")
        .tag("core")
        .build()
}

/// V005: per-call usage log.
#[must_use]
pub fn v005_create_usage_logs() -> Migration {
    Migration::builder(20240601000005, "create_usage_logs")
        .up(r"
            CREATE TABLE IF NOT EXISTS usage_logs (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                organization_id UUID NOT NULL,
                api_key_id UUID NOT NULL,
                model_id UUID NOT NULL,
                endpoint TEXT NOT NULL,
                prompt_tokens INTEGER NOT NULL DEFAULT 0,
                completion_tokens INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                request_id VARCHAR(255),
                response_status INTEGER NOT NULL,
                response_time_ms INTEGER,
                cost_usd NUMERIC(12, 6),
                metadata JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_usage_logs_org_created ON usage_logs(organization_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_usage_logs_key ON usage_logs(api_key_id);
        ")
        .tag("usage")
        .build()
}

/// V006: organization token quotas.
#[must_use]
pub fn v006_create_organization_quotas() -> Migration {
    Migration::builder(20240601000006, "create_organization_quotas")
        .up(r"
            CREATE TABLE IF NOT EXISTS organization_quotas (
                organization_id UUID PRIMARY KEY REFERENCES organizations(id) ON DELETE CASCADE,
                total_quota BIGINT NOT NULL DEFAULT 0,
                used_tokens BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
        ")
        .tag("usage")
        .build()
}
