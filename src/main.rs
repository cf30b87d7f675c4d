//! # RelAI Gateway
//!
//! API gateway in front of LLM providers. Callers authenticate with a
//! gateway key; each call is forwarded to the provider endpoint of a model
//! granted to the caller's organization, and token usage is recorded in the
//! background.
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration and a local .env
//! relai-gateway
//!
//! # Start with a configuration file
//! GATEWAY_CONFIG=/etc/relai/gateway.yaml relai-gateway
//!
//! # Start with environment overrides
//! GATEWAY_PORT=9000 DB_HOST=db.internal relai-gateway
//! ```

use anyhow::Context;
use gateway_config::load_config;
use gateway_server::{AppState, Server, ServerConfig};
use gateway_store::{DatabasePool, Migrator, PgGatewayStore, PoolConfig};
use gateway_telemetry::{init_tracing, shutdown_tracing, TelemetryConfig};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Gateway failed");
        eprintln!("relai-gateway: {e:#}");
        std::process::exit(1);
    }
}

/// Main application logic
async fn run() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is normal outside development.
        if !e.not_found() {
            eprintln!("failed to read .env: {e}");
        }
    }

    let config = load_config().await.context("loading configuration")?;
    let tracer = init_tracing(&TelemetryConfig::from(&config.telemetry))
        .context("initializing tracing")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "Starting RelAI gateway"
    );

    let pool = DatabasePool::connect(&PoolConfig::from_settings(&config.database))
        .await
        .context("connecting to database")?;
    if config.database.run_migrations {
        let applied = Migrator::new(pool.inner().clone())
            .run_pending()
            .await
            .context("running migrations")?;
        info!(applied = applied.len(), "Migrations complete");
    }

    let store = Arc::new(PgGatewayStore::new(pool.inner().clone()));
    let state = AppState::builder()
        .config(config.clone())
        .store(store)
        .build()
        .context("building application state")?;

    match state.policy_cache.reload_all().await {
        Ok(orgs) => info!(organizations = orgs, "Access policy cache loaded"),
        Err(e) => warn!(error = %e, "Initial access policy load failed, loading on demand"),
    }

    state.start_background();
    let refresher = (!config.cache.refresh_interval.is_zero())
        .then(|| state.policy_cache.spawn_refresher(config.cache.refresh_interval));
    gateway_usage::tokenizer::preload();

    let server = Server::new(ServerConfig::from(&config.server), state.clone());
    let coordinator = server.coordinator();
    let served = server.run().await;

    if let Some(refresher) = refresher {
        coordinator
            .stop_service("policy-cache-refresher", refresher.stop())
            .await;
    }
    coordinator
        .stop_service("last-used-queue", state.last_used.stop())
        .await;
    coordinator
        .stop_service("usage-worker-pool", state.tracker.stop())
        .await;
    coordinator.stop_service("database-pool", pool.close()).await;
    coordinator.complete();

    shutdown_tracing(tracer);
    served.context("serving HTTP")
}
