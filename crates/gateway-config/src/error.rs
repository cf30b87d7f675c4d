//! Configuration errors.

use std::path::PathBuf;

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file extension is not yaml, yml or toml.
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// YAML parse failure.
    #[error("invalid yaml config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parse failure.
    #[error("invalid toml config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Field validation failure.
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// Settings that are individually valid but inconsistent.
    #[error("invalid configuration: {0}")]
    Inconsistent(String),
}

impl From<ConfigError> for gateway_core::GatewayError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
