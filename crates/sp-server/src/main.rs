//! SAML artifact-binding SP server binary.

#![forbid(unsafe_code)]
#![deny(warnings)]

use sp_server::{Server, SpConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting SAML artifact SP v{}", env!("CARGO_PKG_VERSION"));

    let config = SpConfig::from_env()?;
    tracing::info!(
        "Configuration loaded: host={}, port={}",
        config.host,
        config.port
    );

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
