//! Bounded background pool that turns captures into persisted usage.
//!
//! Submission never waits: a full queue drops the capture. Workers extract
//! and price each capture, write the usage-log row, and bump the
//! organization's token counter only after that write succeeds, so a retried
//! job is never counted twice.

use crate::tracker::{prepare_job, UsageCapture};
use gateway_config::UsageSettings;
use gateway_core::{UsageLogJob, UsageStore};
use gateway_telemetry::{CostCalculator, GatewayMetrics, UsageJobOutcome};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of workers
    pub worker_count: usize,
    /// Queue capacity
    pub queue_size: usize,
    /// Persistence retries per job
    pub max_retries: u32,
    /// Base delay, multiplied by the retry number
    pub retry_delay: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from(&UsageSettings::default())
    }
}

impl From<&UsageSettings> for WorkerPoolConfig {
    fn from(settings: &UsageSettings) -> Self {
        Self {
            worker_count: settings.worker_count.max(1),
            queue_size: settings.queue_size.max(1),
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorkerPoolStats {
    /// Number of workers
    pub worker_count: usize,
    /// Jobs waiting in the queue
    pub queue_size: usize,
    /// Queue capacity
    pub queue_capacity: usize,
    /// `queue_size / queue_capacity` as a percentage
    #[serde(rename = "queue_utilization_percent")]
    pub queue_utilization: f64,
}

enum Work {
    Capture(Box<UsageCapture>),
    Retry(UsageLogJob),
}

/// Accounts captured calls on a fixed set of background workers.
pub struct UsageWorkerPool {
    config: WorkerPoolConfig,
    store: Arc<dyn UsageStore>,
    cost: CostCalculator,
    metrics: Option<GatewayMetrics>,
    sender: Mutex<Option<mpsc::Sender<Work>>>,
    retry_sender: mpsc::WeakSender<Work>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Work>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for UsageWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageWorkerPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl UsageWorkerPool {
    /// Create a pool pricing usage with `cost`. Captures may be submitted
    /// before [`start`](Self::start); they wait in the queue.
    pub fn new(config: WorkerPoolConfig, store: Arc<dyn UsageStore>, cost: CostCalculator) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        Self {
            retry_sender: sender.downgrade(),
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            workers: Mutex::new(Vec::new()),
            metrics: None,
            config,
            store,
            cost,
        }
    }

    /// Report submissions and queue depth to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: GatewayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Pool configuration.
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Spawn the workers. Calling this twice has no effect.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }

        info!(workers = self.config.worker_count, queue_size = self.config.queue_size, "starting usage worker pool");
        for id in 0..self.config.worker_count {
            let worker = Worker {
                id,
                receiver: Arc::clone(&self.receiver),
                retry_sender: self.retry_sender.clone(),
                store: Arc::clone(&self.store),
                cost: self.cost.clone(),
                max_retries: self.config.max_retries,
                retry_delay: self.config.retry_delay,
            };
            workers.push(tokio::spawn(worker.run()));
        }
    }

    /// Enqueue a capture without waiting.
    ///
    /// Returns `false` when the queue is full or the pool has stopped; the
    /// capture is dropped.
    pub fn submit(&self, capture: UsageCapture) -> bool {
        let org_id = capture.org_id.clone();
        let accepted = match self.sender.lock().as_ref() {
            None => {
                warn!(%org_id, "usage worker pool stopped, dropping capture");
                false
            }
            Some(sender) => match sender.try_send(Work::Capture(Box::new(capture))) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(%org_id, "usage queue is full, dropping capture");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(%org_id, "usage queue closed, dropping capture");
                    false
                }
            },
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_usage_job(if accepted {
                UsageJobOutcome::Queued
            } else {
                UsageJobOutcome::Dropped
            });
            metrics.set_usage_queue_depth(self.queue_len());
        }
        accepted
    }

    /// Jobs currently waiting.
    pub fn queue_len(&self) -> usize {
        self.retry_sender
            .upgrade()
            .map_or(0, |s| s.max_capacity() - s.capacity())
    }

    /// Queue statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        let queue_size = self.queue_len();
        let queue_capacity = self.config.queue_size.max(1);
        WorkerPoolStats {
            worker_count: self.config.worker_count,
            queue_size,
            queue_capacity,
            queue_utilization: queue_size as f64 / queue_capacity as f64 * 100.0,
        }
    }

    /// Stop accepting captures, let the workers drain the queue, then join
    /// them.
    ///
    /// Jobs waiting on a persistence retry delay when the queue closes are
    /// dropped.
    pub async fn stop(&self) {
        info!("stopping usage worker pool");
        drop(self.sender.lock().take());

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "usage worker panicked");
            }
        }
        info!("usage worker pool stopped");
    }
}

struct Worker {
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Work>>>,
    retry_sender: mpsc::WeakSender<Work>,
    store: Arc<dyn UsageStore>,
    cost: CostCalculator,
    max_retries: u32,
    retry_delay: Duration,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "usage worker started");
        loop {
            let work = self.receiver.lock().await.recv().await;
            match work {
                Some(Work::Capture(capture)) => {
                    if let Some(job) = prepare_job(*capture, &self.cost).await {
                        self.persist(job).await;
                    }
                }
                Some(Work::Retry(job)) => self.persist(job).await,
                None => break,
            }
        }
        debug!(worker = self.id, "usage worker stopped");
    }

    async fn persist(&self, mut job: UsageLogJob) {
        if let Err(e) = self.store.insert_usage_log(&job).await {
            if job.retry_count >= self.max_retries {
                error!(
                    worker = self.id,
                    org_id = %job.org_id,
                    retries = job.retry_count,
                    error = %e,
                    "usage log retries exhausted, dropping job"
                );
                return;
            }

            job.retry_count += 1;
            let delay = self.retry_delay * job.retry_count;
            warn!(
                worker = self.id,
                org_id = %job.org_id,
                attempt = job.retry_count,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "failed to write usage log, scheduling retry"
            );
            self.schedule_retry(job, delay);
            return;
        }

        let tokens = job.usage.total_tokens;
        if tokens > 0 {
            if let Err(e) = self.store.increment_used_tokens(&job.org_id, tokens).await {
                warn!(worker = self.id, org_id = %job.org_id, error = %e, "failed to update organization usage");
            }
        }
        debug!(worker = self.id, org_id = %job.org_id, tokens, "usage logged");
    }

    fn schedule_retry(&self, job: UsageLogJob, delay: Duration) {
        let sender = self.retry_sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(sender) = sender.upgrade() else {
                warn!(org_id = %job.org_id, "usage worker pool stopped, dropping retried job");
                return;
            };
            if let Err(e) = sender.try_send(Work::Retry(job)) {
                warn!(error = %e, "could not requeue usage job, dropping it");
            }
        });
    }
}
