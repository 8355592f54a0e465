//! Server setup and lifecycle management

use crate::bootstrap::Bootstrap;
use crate::config::MasterConfig;
use crate::error::{MasterError, MasterResult};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Keel master server
pub struct Server {
    config: MasterConfig,
}

impl Server {
    pub fn new(config: MasterConfig) -> Self {
        Self { config }
    }

    /// Bootstraps the master and serves the API until shutdown.
    pub async fn run(self) -> MasterResult<()> {
        let addr = SocketAddr::from((self.config.address, self.config.port));
        let base = format!("http://{}:{}", self.config.public_address, self.config.port);

        let running = Bootstrap::new(self.config).run()?;
        for descriptor in &running.descriptors {
            tracing::info!("{}", descriptor.render(&base));
        }

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Keel master listening on {}", addr);

        axum::serve(listener, running.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| MasterError::Server(e.to_string()))?;

        tracing::info!("Keel master shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
