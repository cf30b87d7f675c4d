//! # Gateway Core
//!
//! Core types, traits, and error handling for the RelAI gateway.
//!
//! This crate provides the foundational types shared by every pipeline stage:
//! - Accessible models and their reliability policy
//! - The typed per-request context attached by authentication
//! - Token usage and usage-log jobs
//! - Storage traits implemented by the PostgreSQL store and test doubles
//! - Error types and their HTTP mapping

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod model;
pub mod store;
pub mod usage;

// Re-export commonly used types
pub use context::RequestContext;
pub use error::{GatewayError, GatewayResult, StoreError};
pub use model::{AccessibleModel, CatalogModel, ModelPricing, ReliabilityPolicy};
pub use store::{ApiKeyRecord, GatewayStore, KeyStore, ModelStore, UsageStore};
pub use usage::{TokenUsage, UsageLogJob};
