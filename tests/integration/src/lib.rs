//! Integration tests for the RelAI gateway
//!
//! Each test runs the real router on a local port, backed by an in-memory
//! store, with providers mocked by wiremock. Covered:
//! - Authentication and model access
//! - Forwarding, retry and timeout behaviour
//! - Streaming relay
//! - Usage accounting
//! - Access policy cache freshness

pub mod fixtures;
pub mod helpers;
pub mod mock_providers;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;
pub use mock_providers::*;

#[cfg(test)]
mod api_tests;
#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod proxy_tests;
#[cfg(test)]
mod usage_tests;
