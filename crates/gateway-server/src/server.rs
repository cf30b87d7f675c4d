//! HTTP listener.

use crate::routes::create_router;
use crate::shutdown::{shutdown_signal, ShutdownConfig, ShutdownCoordinator};
use crate::state::AppState;
use axum::Router;
use gateway_config::ServerSettings;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying error
        source: std::io::Error,
    },
    /// Serving failed
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, `host:port`
    pub addr: String,
    /// Shutdown timing
    pub shutdown: ShutdownConfig,
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            addr: format!("{}:{}", settings.host, settings.port),
            shutdown: ShutdownConfig::default(),
        }
    }
}

/// Gateway HTTP server.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    router: Router,
    coordinator: Arc<ShutdownCoordinator>,
}

impl Server {
    /// Create a server for `state`.
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        let coordinator = Arc::new(ShutdownCoordinator::new(config.shutdown.clone()));
        Self {
            config,
            router: create_router(state),
            coordinator,
        }
    }

    /// Shutdown coordinator shared with the caller.
    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Bind and serve until a shutdown signal arrives and in-flight
    /// requests have finished.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.addr.clone(),
                source,
            })?;

        let coordinator = self.coordinator();
        let signals = tokio::spawn(async move {
            let reason = shutdown_signal().await;
            coordinator.trigger(&reason);
        });

        let result = self.serve(listener).await;
        signals.abort();
        result
    }

    /// Serve on an already bound listener until the coordinator is
    /// triggered.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr: Option<SocketAddr> = listener.local_addr().ok();
        info!(addr = ?addr, "Gateway listening");

        let coordinator = self.coordinator;
        let graceful_timeout = self.config.shutdown.graceful_timeout;
        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(coordinator.triggered())
            .into_future();
        tokio::pin!(serve);

        let deadline = {
            let triggered = coordinator.triggered();
            async move {
                triggered.await;
                tokio::time::sleep(graceful_timeout).await;
            }
        };

        tokio::select! {
            result = &mut serve => result?,
            () = deadline => warn!(
                timeout_secs = graceful_timeout.as_secs(),
                "Graceful timeout exceeded, closing remaining connections"
            ),
        }
        info!("HTTP server stopped");
        Ok(())
    }
}
