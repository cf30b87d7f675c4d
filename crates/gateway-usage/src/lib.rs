//! # Gateway Usage
//!
//! Usage accounting for proxied calls.
//!
//! - Streaming classification shared with the relay
//! - Transparent decompression of captured bodies
//! - Provider-shaped usage extraction with a token-counting fallback
//! - A bounded worker pool that persists usage without blocking callers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod decompress;
pub mod extractor;
pub mod tokenizer;
pub mod tracker;
pub mod worker_pool;

pub use classify::{is_streaming, SNIFF_LEN};
pub use decompress::decompress_if_needed;
pub use extractor::{extract_usage, ExtractFailure, ProviderFormat};
pub use tokenizer::{count_stream_usage, count_tokens, Encoding};
pub use tracker::{extract, ExtractionKind, UsageCapture, UsageTracker, UsageTrackerStats};
pub use worker_pool::{UsageWorkerPool, WorkerPoolConfig, WorkerPoolStats};
