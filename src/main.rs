//! Daily Jeopardy Lobby Server
//!
//! Hosts multiplayer lobbies over WebSocket.
//! Configured through `LOBBY_*` environment variables, logging through `RUST_LOG`.

use std::sync::Arc;
use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use jeopardy_lobby::{LobbyServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let config = ServerConfig::from_env().context("invalid configuration")?;

    info!("Jeopardy Lobby Server v{}", VERSION);
    info!(
        "Policies: leader={:?} rejoin={:?} authorization={:?}",
        config.policy.leader, config.policy.rejoin, config.policy.authorization
    );
    match &config.allowed_origin {
        Some(origin) => info!("Accepting origin {}", origin),
        None => info!("Accepting any origin"),
    }

    let server = Arc::new(LobbyServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down");
                signal_server.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    server.run().await.context("lobby server failed")?;

    info!("Lobby server stopped");
    Ok(())
}
