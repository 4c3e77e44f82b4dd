//! Rummy Server
//!
//! Binds the WebSocket listener and serves rooms until Ctrl-C.

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rummy::{GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    info!("Rummy Server v{}", VERSION);
    info!(
        bind = %config.bind_addr,
        max_connections = config.max_connections,
        idle_timeout_secs = config.idle_timeout.as_secs(),
        ace_high = config.rules.ace_high,
        max_penalty = config.rules.max_penalty,
        "Configuration loaded"
    );

    let server = Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_server.shutdown();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;

    info!(rooms = server.room_count().await, "Server stopped");
    Ok(())
}
