//! Configuration model.

use gateway_core::ReliabilityPolicy;
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;
use validator::Validate;

/// Root gateway configuration.
#[derive(Debug, Clone, Deserialize, Validate, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener
    #[validate(nested)]
    pub server: ServerSettings,
    /// PostgreSQL connection
    #[validate(nested)]
    pub database: DatabaseSettings,
    /// Usage accounting pipeline
    #[validate(nested)]
    pub usage: UsageSettings,
    /// Outbound calls to providers
    #[validate(nested)]
    pub upstream: UpstreamSettings,
    /// API key authentication
    #[validate(nested)]
    pub auth: AuthSettings,
    /// Access policy cache
    pub cache: CacheSettings,
    /// Logging and tracing
    #[validate(nested)]
    pub telemetry: TelemetrySettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address
    #[validate(length(min = 1))]
    pub host: String,
    /// Listen port (`GATEWAY_PORT`)
    #[validate(range(min = 1))]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// PostgreSQL settings.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Full connection string (`POSTGRES_DSN`); wins over the discrete fields
    pub dsn: Option<SecretString>,
    /// Host (`DB_HOST`)
    #[validate(length(min = 1))]
    pub host: String,
    /// Port (`DB_PORT`)
    pub port: u16,
    /// User (`DB_USER`)
    pub user: String,
    /// Password (`DB_PASSWORD`)
    pub password: SecretString,
    /// Database name (`DB_NAME`)
    #[validate(length(min = 1))]
    pub name: String,
    /// SSL mode (`DB_SSLMODE`)
    pub ssl_mode: String,
    /// Maximum pool connections
    #[validate(range(min = 1))]
    pub max_connections: u32,
    /// Minimum pool connections
    pub min_connections: u32,
    /// Connection acquire timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Idle connection timeout
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Apply pending migrations at startup (`DB_RUN_MIGRATIONS`)
    pub run_migrations: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            dsn: None,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: SecretString::new("postgres".to_string()),
            name: "relai_gateway".to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: 20,
            min_connections: 1,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }
}

/// Usage worker pool settings.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct UsageSettings {
    /// Tracking enabled (`USAGE_TRACKING_DISABLED` clears it)
    pub enabled: bool,
    /// Worker tasks (`USAGE_WORKER_COUNT`)
    #[validate(range(min = 1))]
    pub worker_count: usize,
    /// Queue capacity (`USAGE_QUEUE_SIZE`)
    #[validate(range(min = 1))]
    pub queue_size: usize,
    /// Persistence retries (`USAGE_MAX_RETRIES`)
    pub max_retries: u32,
    /// Base retry delay, scaled by attempt (`USAGE_RETRY_DELAY`)
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Batch size; carried for compatibility, batching is not performed
    pub batch_size: usize,
    /// Batch flush timeout
    #[serde(with = "humantime_serde")]
    pub batch_timeout: Duration,
    /// Batching switch
    pub enable_batching: bool,
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_count: 5,
            queue_size: 1000,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            batch_size: 10,
            batch_timeout: Duration::from_secs(5),
            enable_batching: false,
        }
    }
}

/// Outbound provider call settings.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Redirect every call to the dummy backend (`USE_DUMMY_BACKEND=1`)
    pub use_dummy_backend: bool,
    /// Dummy backend base URL (`DUMMY_BACKEND_HOST`)
    pub dummy_backend_host: Option<String>,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
    /// How long idle connections are kept
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Duration,
    /// Timeout when the model sets none
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Retries when the model sets none
    #[validate(range(max = 10))]
    pub default_max_retries: u32,
    /// Retry delay when the model sets none
    #[serde(with = "humantime_serde")]
    pub default_retry_delay: Duration,
    /// Backoff multiplier when the model sets none
    #[validate(range(min = 1.0, max = 5.0))]
    pub default_backoff_multiplier: f64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        let policy = ReliabilityPolicy::default();
        Self {
            use_dummy_backend: false,
            dummy_backend_host: None,
            pool_max_idle_per_host: 100,
            pool_idle_timeout: Duration::from_secs(90),
            default_timeout: policy.timeout,
            default_max_retries: policy.max_retries,
            default_retry_delay: policy.retry_delay,
            default_backoff_multiplier: policy.backoff_multiplier,
        }
    }
}

impl UpstreamSettings {
    /// Process-wide fallback reliability policy.
    #[must_use]
    pub fn default_policy(&self) -> ReliabilityPolicy {
        ReliabilityPolicy {
            timeout: self.default_timeout,
            max_retries: self.default_max_retries,
            retry_delay: self.default_retry_delay,
            backoff_multiplier: self.default_backoff_multiplier,
        }
    }
}

/// API key authentication settings.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct AuthSettings {
    /// Required key prefix
    #[validate(length(min = 1))]
    pub key_prefix: String,
    /// Capacity of the last-used update queue
    #[validate(range(min = 1))]
    pub last_used_queue_size: usize,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            key_prefix: "sk-".to_string(),
            last_used_queue_size: 1024,
        }
    }
}

/// Access policy cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Background refresh interval; zero disables refresh (`POLICY_CACHE_REFRESH`)
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(300),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Logging and tracing settings.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Default filter when `RUST_LOG` is unset (`LOG_LEVEL`)
    pub log_level: String,
    /// Output format (`LOG_FORMAT`)
    pub log_format: LogFormat,
    /// Install the OpenTelemetry layer (`OTEL_ENABLED`)
    pub otel_enabled: bool,
    /// Trace sampling ratio (`OTEL_SAMPLING_RATE`)
    #[validate(range(min = 0.0, max = 1.0))]
    pub otel_sampling_rate: f64,
    /// Service name reported in traces
    pub service_name: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            otel_enabled: false,
            otel_sampling_rate: 1.0,
            service_name: "relai-gateway".to_string(),
        }
    }
}
