//! # Gateway Config
//!
//! Configuration for the RelAI gateway.
//!
//! Settings are layered: built-in defaults, then an optional YAML or TOML
//! file named by `GATEWAY_CONFIG`, then environment variables. The result is
//! validated before use.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod loader;

pub use config::{
    AuthSettings, CacheSettings, DatabaseSettings, GatewayConfig, LogFormat, ServerSettings,
    TelemetrySettings, UpstreamSettings, UsageSettings,
};
pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_env_overrides, load_config, load_config_with, ConfigLoader};
