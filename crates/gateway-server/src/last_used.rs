//! Background "last used" stamping for API keys.
//!
//! Authentication records the key id and moves on; a single worker applies
//! the updates. A full queue drops the update.

use gateway_core::KeyStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Counters {
    applied: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LastUsedStats {
    /// Updates written
    pub applied: u64,
    /// Updates that failed in storage
    pub failed: u64,
    /// Updates dropped because the queue was full or stopped
    pub dropped: u64,
}

/// Bounded queue of key ids whose last-used time should be stamped.
pub struct LastUsedQueue {
    store: Arc<dyn KeyStore>,
    sender: Mutex<Option<mpsc::Sender<String>>>,
    receiver: Mutex<Option<mpsc::Receiver<String>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for LastUsedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LastUsedQueue")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl LastUsedQueue {
    /// Create a queue holding at most `capacity` pending updates.
    pub fn new(store: Arc<dyn KeyStore>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            store,
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Spawn the worker. Calling this twice has no effect.
    pub fn start(&self) {
        let Some(mut receiver) = self.receiver.lock().take() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let counters = Arc::clone(&self.counters);

        let handle = tokio::spawn(async move {
            while let Some(key_id) = receiver.recv().await {
                match store.touch_last_used(&key_id).await {
                    Ok(()) => {
                        counters.applied.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(key_id = %key_id, error = %e, "failed to update API key last used");
                    }
                }
            }
            debug!("last-used worker stopped");
        });
        *self.worker.lock() = Some(handle);
    }

    /// Queue an update for `key_id` without waiting.
    pub fn record(&self, key_id: &str) -> bool {
        let result = match self.sender.lock().as_ref() {
            Some(sender) => sender.try_send(key_id.to_string()),
            None => Err(TrySendError::Closed(key_id.to_string())),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(key_id, reason = %e, "last-used update dropped");
                false
            }
        }
    }

    /// Queue statistics.
    pub fn stats(&self) -> LastUsedStats {
        LastUsedStats {
            applied: self.counters.applied.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting updates and wait for queued ones to be written.
    pub async fn stop(&self) {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                warn!(error = %e, "last-used worker panicked");
            }
        }
    }
}
