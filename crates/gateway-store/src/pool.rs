//! PostgreSQL connection pool.

use crate::error::{DatabaseError, Result};
use gateway_config::DatabaseSettings;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connection string; when set it wins over the discrete fields.
    pub dsn: Option<SecretString>,
    /// Host.
    pub host: String,
    /// Port.
    pub port: u16,
    /// User.
    pub user: String,
    /// Password.
    pub password: SecretString,
    /// Database name.
    pub database: String,
    /// libpq-style SSL mode.
    pub ssl_mode: String,
    /// Maximum number of connections.
    pub max_connections: u32,
    /// Minimum number of connections.
    pub min_connections: u32,
    /// Acquire timeout.
    pub connect_timeout: Duration,
    /// Idle timeout for connections.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_settings(&DatabaseSettings::default())
    }
}

impl PoolConfig {
    /// Derive pool settings from the gateway configuration.
    #[must_use]
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        Self {
            dsn: settings.dsn.clone(),
            host: settings.host.clone(),
            port: settings.port,
            user: settings.user.clone(),
            password: settings.password.clone(),
            database: settings.name.clone(),
            ssl_mode: settings.ssl_mode.clone(),
            max_connections: settings.max_connections,
            min_connections: settings.min_connections,
            connect_timeout: settings.connect_timeout,
            idle_timeout: settings.idle_timeout,
        }
    }

    /// Create a new builder.
    #[must_use]
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Resolve connection options.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        if let Some(dsn) = &self.dsn {
            return PgConnectOptions::from_str(dsn.expose_secret())
                .map_err(|e| DatabaseError::Config(e.to_string()));
        }

        let ssl_mode = PgSslMode::from_str(&self.ssl_mode)
            .map_err(|e| DatabaseError::Config(format!("invalid ssl mode: {e}")))?;

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(self.password.expose_secret())
            .database(&self.database)
            .ssl_mode(ssl_mode))
    }
}

/// Builder for pool configuration.
#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Use a full connection string.
    #[must_use]
    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.config.dsn = Some(SecretString::new(dsn.into()));
        self
    }

    /// Set maximum connections.
    #[must_use]
    pub fn max_connections(mut self, max: u32) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Set minimum connections.
    #[must_use]
    pub fn min_connections(mut self, min: u32) -> Self {
        self.config.min_connections = min;
        self
    }

    /// Set connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

/// Database connection pool.
pub struct DatabasePool {
    pool: PgPool,
    max_connections: u32,
}

impl DatabasePool {
    /// Connect a new pool.
    pub async fn connect(config: &PoolConfig) -> Result<Self> {
        let options = config.connect_options()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "database pool connected"
        );

        Ok(Self {
            pool,
            max_connections: config.max_connections,
        })
    }

    /// Get a reference to the underlying pool.
    #[must_use]
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max_connections: self.max_connections,
        }
    }
}

impl std::fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabasePool")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Current number of connections.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum connections allowed.
    pub max_connections: u32,
}

impl PoolStats {
    /// Number of connections in use.
    #[must_use]
    pub fn active(&self) -> usize {
        (self.size as usize).saturating_sub(self.idle)
    }
}
