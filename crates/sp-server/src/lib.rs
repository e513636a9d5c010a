//! # sp-server
//!
//! Axum server hosting a SAML 2.0 artifact-binding service provider.
//!
//! The server exposes:
//! - the Assertion Consumer Service (`SP_ACS_PATH`, default `/saml/acs`)
//! - the login entry point (`/saml/login?goto=...`)
//! - health check endpoints
//!
//! ## Usage
//!
//! ```ignore
//! use sp_server::{Server, SpConfig};
//!
//! let config = SpConfig::from_env()?;
//! let server = Server::new(config)?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod keys;
pub mod router;

pub use config::{ConfigError, SpConfig};
pub use router::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sp_protocol_saml::endpoints::SpState;
use sp_protocol_saml::pipeline::ArtifactConsumer;
use sp_protocol_saml::session::InMemorySessionStore;
use tokio::net::TcpListener;

/// The service provider server.
pub struct Server {
    config: SpConfig,
    state: SpState,
}

impl Server {
    /// Creates a new server instance.
    ///
    /// Loads the key material and builds the artifact pipeline.
    pub fn new(config: SpConfig) -> anyhow::Result<Self> {
        let credentials = keys::load_credentials(&config)?;
        let consumer = ArtifactConsumer::new(
            config.consumer_config(),
            Arc::new(credentials),
            Arc::new(InMemorySessionStore::new()),
        )?;

        tracing::info!(
            entity_id = %config.entity_id,
            idp = %config.idp_entity_id,
            artifact_resolution_url = %config.idp_artifact_resolution_url,
            "Artifact consumer configured"
        );

        let state = SpState::new(consumer, config.idp_sso_url.clone())
            .with_secure_cookies(config.secure_cookies);
        Ok(Self { config, state })
    }

    /// Runs the server.
    ///
    /// This starts the HTTP server and blocks until it receives a shutdown signal.
    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.router();

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &SpConfig {
        &self.config
    }

    /// Creates the router without starting the server.
    pub fn router(&self) -> Router {
        create_router(self.state.clone(), &self.config.acs_path)
    }
}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
