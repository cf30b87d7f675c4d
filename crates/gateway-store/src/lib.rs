//! # Gateway Store
//!
//! PostgreSQL persistence for the RelAI gateway.
//!
//! This crate provides:
//! - Connection pool construction from [`gateway_config::DatabaseSettings`]
//! - Versioned, checksummed schema migrations
//! - [`PgGatewayStore`], the PostgreSQL implementation of the core storage traits
//! - [`MemoryStore`], an in-process implementation for development and tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use gateway_store::{DatabasePool, Migrator, PgGatewayStore, PoolConfig};
//!
//! # async fn run(settings: gateway_config::DatabaseSettings) -> gateway_store::Result<()> {
//! let pool = DatabasePool::connect(&PoolConfig::from_settings(&settings)).await?;
//! Migrator::new(pool.inner().clone()).run_pending().await?;
//! let store = PgGatewayStore::new(pool.inner().clone());
//! # let _ = store;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod migration;
pub mod migrator;
pub mod pool;
pub mod postgres;
pub mod schema;

pub use error::{DatabaseError, Result};
pub use memory::MemoryStore;
pub use migration::{Migration, MigrationRecord};
pub use migrator::Migrator;
pub use pool::{DatabasePool, PoolConfig, PoolStats};
pub use postgres::PgGatewayStore;

/// Re-export sqlx types for convenience
pub use sqlx;
