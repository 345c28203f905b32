//! HTTP server components for registry-scan-gate
//!
//! This module provides the HTTP server infrastructure including:
//! - Dispatcher routing manifest reads through the scan gate
//! - Trace middleware
//! - Listener lifecycle management

pub mod middleware;
pub mod router;

pub use middleware::{trace_middleware, TraceId};
pub use router::{build_router, AppState};

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::EntrypointConfig;

/// HTTP listener for one entrypoint
///
/// Manages the axum server lifecycle, including:
/// - Binding to the entrypoint address
/// - Applying middleware layers
/// - Graceful shutdown handling
pub struct Server {
    config: EntrypointConfig,
    state: AppState,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: EntrypointConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> Result<SocketAddr, ServerError> {
        self.config
            .listen_addr()
            .map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Bind the listener
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.bind_addr()?;
        TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{}: {}", addr, e)))
    }

    /// Run the server until shutdown signal is received
    ///
    /// # Arguments
    ///
    /// * `shutdown` - Future that resolves when the server should shut down
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let name = self.config.name.clone();
        let upstream = self.config.upstream_url.clone();
        let app = build_router(self.state).layer(tower_http::trace::TraceLayer::new_for_http());

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))?;
        tracing::info!(
            entrypoint = %name,
            address = %local_addr,
            upstream = %upstream,
            "Server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!(entrypoint = %name, "Server shutdown complete");
        Ok(())
    }
}

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// Failed to serve requests
    #[error("Server error: {0}")]
    Serve(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
