//! Layered configuration loading.

use crate::config::{GatewayConfig, LogFormat};
use crate::error::{ConfigError, ConfigResult};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use validator::Validate;

/// Environment variable naming an optional config file.
pub const CONFIG_FILE_ENV: &str = "GATEWAY_CONFIG";

/// Loads configuration from defaults, an optional file and the environment.
#[derive(Debug, Default, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader without a config file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read this file before applying environment overrides.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Build the configuration, resolving variables through `lookup`.
    pub async fn load<F>(&self, lookup: F) -> ConfigResult<GatewayConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.file {
            Some(path) => read_file(path).await?,
            None => GatewayConfig::default(),
        };

        apply_env_overrides(&mut config, &lookup);
        config.validate()?;
        check_consistency(&config)?;

        debug!(
            port = config.server.port,
            workers = config.usage.worker_count,
            queue_size = config.usage.queue_size,
            dummy_backend = config.upstream.use_dummy_backend,
            "configuration loaded"
        );
        Ok(config)
    }
}

/// Load configuration from the process environment.
pub async fn load_config() -> ConfigResult<GatewayConfig> {
    load_config_with(|key| std::env::var(key).ok()).await
}

/// Load configuration resolving every variable through `lookup`.
pub async fn load_config_with<F>(lookup: F) -> ConfigResult<GatewayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut loader = ConfigLoader::new();
    if let Some(path) = lookup(CONFIG_FILE_ENV).filter(|p| !p.is_empty()) {
        loader = loader.with_file(path);
    }
    loader.load(lookup).await
}

async fn read_file(path: &Path) -> ConfigResult<GatewayConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => Ok(serde_yaml::from_str(&content)?),
        Some("toml") => Ok(toml::from_str(&content)?),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

/// Apply environment overrides on top of `config`.
///
/// Values that fail to parse are logged and ignored.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };

    if let Some(port) = env.parse("GATEWAY_PORT") {
        config.server.port = port;
    }

    let db = &mut config.database;
    if let Some(dsn) = env.string("POSTGRES_DSN") {
        db.dsn = Some(SecretString::new(dsn));
    }
    if let Some(host) = env.string("DB_HOST") {
        db.host = host;
    }
    if let Some(port) = env.parse("DB_PORT") {
        db.port = port;
    }
    if let Some(user) = env.string("DB_USER") {
        db.user = user;
    }
    if let Some(password) = env.string("DB_PASSWORD") {
        db.password = SecretString::new(password);
    }
    if let Some(name) = env.string("DB_NAME") {
        db.name = name;
    }
    if let Some(mode) = env.string("DB_SSLMODE") {
        db.ssl_mode = mode;
    }
    if let Some(run) = env.flag("DB_RUN_MIGRATIONS") {
        db.run_migrations = run;
    }

    let usage = &mut config.usage;
    if let Some(count) = env.parse("USAGE_WORKER_COUNT") {
        usage.worker_count = count;
    }
    if let Some(size) = env.parse("USAGE_QUEUE_SIZE") {
        usage.queue_size = size;
    }
    if let Some(retries) = env.parse("USAGE_MAX_RETRIES") {
        usage.max_retries = retries;
    }
    if let Some(delay) = env.duration("USAGE_RETRY_DELAY") {
        usage.retry_delay = delay;
    }
    if env.flag("USAGE_TRACKING_DISABLED") == Some(true) {
        usage.enabled = false;
    }

    if let Some(dummy) = env.flag("USE_DUMMY_BACKEND") {
        config.upstream.use_dummy_backend = dummy;
    }
    if let Some(host) = env.string("DUMMY_BACKEND_HOST") {
        config.upstream.dummy_backend_host = Some(host);
    }

    if let Some(interval) = env.duration("POLICY_CACHE_REFRESH") {
        config.cache.refresh_interval = interval;
    }

    let telemetry = &mut config.telemetry;
    if let Some(level) = env.string("LOG_LEVEL") {
        telemetry.log_level = level;
    }
    match env.string("LOG_FORMAT").as_deref() {
        Some("json") => telemetry.log_format = LogFormat::Json,
        Some("text") => telemetry.log_format = LogFormat::Text,
        Some(other) => warn!(value = other, "ignoring invalid LOG_FORMAT"),
        None => {}
    }
    if let Some(enabled) = env.flag("OTEL_ENABLED") {
        telemetry.otel_enabled = enabled;
    }
    if let Some(rate) = env.parse("OTEL_SAMPLING_RATE") {
        telemetry.otel_sampling_rate = rate;
    }
}

fn check_consistency(config: &GatewayConfig) -> ConfigResult<()> {
    let db = &config.database;
    if db.min_connections > db.max_connections {
        return Err(ConfigError::Inconsistent(format!(
            "database.min_connections ({}) exceeds database.max_connections ({})",
            db.min_connections, db.max_connections
        )));
    }
    if config.upstream.use_dummy_backend && config.upstream.dummy_backend_host.is_none() {
        warn!("dummy backend enabled without DUMMY_BACKEND_HOST; proxied calls will fail");
    }
    Ok(())
}

struct Env<'a, F> {
    lookup: &'a F,
}

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.string(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = %raw, "ignoring invalid environment value");
                None
            }
        }
    }

    fn flag(&self, key: &str) -> Option<bool> {
        let raw = self.string(key)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => {
                warn!(key, value = %raw, "ignoring invalid boolean environment value");
                None
            }
        }
    }

    fn duration(&self, key: &str) -> Option<Duration> {
        let raw = self.string(key)?;
        match humantime_serde::re::humantime::parse_duration(raw.trim()) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(key, value = %raw, error = %e, "ignoring invalid duration");
                None
            }
        }
    }
}
