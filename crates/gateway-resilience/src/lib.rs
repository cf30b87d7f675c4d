//! # Gateway Resilience
//!
//! Reliability for outbound provider calls:
//! - Retry policy with exponential backoff
//! - Retrying HTTP transport with per-model timeout

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod retry;
pub mod transport;

// Re-export main types
pub use retry::{RetryConfig, RetryOutcome, RetryPolicy};
pub use transport::{RetryingTransport, TransportConfig, UpstreamRequest, UpstreamResponse};
