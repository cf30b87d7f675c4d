//! Graceful shutdown handling for the gateway.
//!
//! Shutdown runs in phases: the listener stops and in-flight requests
//! finish, then background services are drained in order. The coordinator
//! tracks the phase; waiters are released once shutdown is triggered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown configuration
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time to wait for in-flight requests to complete
    pub graceful_timeout: Duration,
    /// Maximum time each background service gets to drain
    pub service_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(30),
            service_timeout: Duration::from_secs(10),
        }
    }
}

/// Shutdown phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// Listener closed, in-flight requests finishing
    DrainingRequests,
    /// Background services draining
    StoppingServices,
    /// Shutdown complete
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::DrainingRequests => write!(f, "draining_requests"),
            Self::StoppingServices => write!(f, "stopping_services"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Tracks shutdown progress.
pub struct ShutdownCoordinator {
    config: ShutdownConfig,
    phase: watch::Sender<ShutdownPhase>,
    phase_rx: watch::Receiver<ShutdownPhase>,
    triggered: AtomicBool,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("phase", &self.current_phase())
            .finish_non_exhaustive()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(ShutdownConfig::default())
    }
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    #[must_use]
    pub fn new(config: ShutdownConfig) -> Self {
        let (phase, phase_rx) = watch::channel(ShutdownPhase::Running);
        Self {
            config,
            phase,
            phase_rx,
            triggered: AtomicBool::new(false),
        }
    }

    /// Shutdown configuration
    pub fn config(&self) -> &ShutdownConfig {
        &self.config
    }

    /// Check if shutdown is in progress
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Get current shutdown phase
    #[must_use]
    pub fn current_phase(&self) -> ShutdownPhase {
        *self.phase_rx.borrow()
    }

    /// Start shutdown. Only the first call has an effect.
    pub fn trigger(&self, reason: &str) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Shutdown already triggered");
            return;
        }
        info!(reason = %reason, "Initiating graceful shutdown");
        self.advance(ShutdownPhase::DrainingRequests);
    }

    /// Move to `phase`. Phases never go backwards.
    pub fn advance(&self, phase: ShutdownPhase) {
        let changed = self.phase.send_if_modified(|current| {
            if phase > *current {
                *current = phase;
                true
            } else {
                false
            }
        });
        if changed {
            info!(phase = %phase, "Shutdown phase changed");
        }
    }

    /// Resolves once shutdown has been triggered.
    pub fn triggered(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.phase_rx.clone();
        async move {
            if rx.wait_for(|p| *p != ShutdownPhase::Running).await.is_err() {
                warn!("Shutdown coordinator dropped");
            }
        }
    }

    /// Run `stop` for a named service, bounded by the service timeout.
    pub async fn stop_service<F>(&self, name: &str, stop: F)
    where
        F: std::future::Future<Output = ()>,
    {
        self.advance(ShutdownPhase::StoppingServices);
        match tokio::time::timeout(self.config.service_timeout, stop).await {
            Ok(()) => info!(service = name, "Service stopped"),
            Err(_) => warn!(
                service = name,
                timeout_secs = self.config.service_timeout.as_secs(),
                "Service did not stop in time"
            ),
        }
    }

    /// Mark shutdown complete.
    pub fn complete(&self) {
        self.advance(ShutdownPhase::Complete);
        info!("Graceful shutdown complete");
    }
}

#[cfg(unix)]
async fn unix_signal(kind: signal::unix::SignalKind, name: &'static str) -> &'static str {
    match signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
            name
        }
        Err(e) => {
            error!(signal = name, error = %e, "failed to install signal handler");
            std::future::pending().await
        }
    }
}

/// Wait for Ctrl+C, SIGTERM or SIGINT and return which one arrived.
pub async fn shutdown_signal() -> String {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => "ctrl+c",
            Err(e) => {
                error!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let sigterm = unix_signal(signal::unix::SignalKind::terminate(), "sigterm");
    #[cfg(unix)]
    let sigint = unix_signal(signal::unix::SignalKind::interrupt(), "sigint");

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<&str>();
    #[cfg(not(unix))]
    let sigint = std::future::pending::<&str>();

    let received = tokio::select! {
        s = ctrl_c => s,
        s = sigterm => s,
        s = sigint => s,
    };
    info!(signal = received, "Received shutdown signal");
    received.to_string()
}
