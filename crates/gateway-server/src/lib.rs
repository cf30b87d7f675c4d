//! # Gateway Server
//!
//! HTTP front end of the RelAI gateway.
//!
//! This crate provides:
//! - API key authentication and per-organization model access
//! - Request dispatch to the granted model's provider endpoint
//! - Response relay, buffered or streamed, with usage capture
//! - OpenAI-compatible model listing
//! - Graceful shutdown handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod last_used;
pub mod policy_cache;
pub mod relay;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;

// Re-export main types
pub use auth::{extract_token, optional_auth, require_auth, AuthResolver};
pub use dispatcher::{detect_model, DispatchPlan, Dispatcher};
pub use error::ApiError;
pub use last_used::{LastUsedQueue, LastUsedStats};
pub use policy_cache::{AccessPolicyCache, CacheRefresher, PolicyCacheStats};
pub use relay::{relay, Accounting, RELAY_CHUNK_SIZE};
pub use routes::create_router;
pub use server::{Server, ServerConfig, ServerError};
pub use shutdown::{shutdown_signal, ShutdownConfig, ShutdownCoordinator, ShutdownPhase};
pub use state::{AppState, AppStateBuilder};
