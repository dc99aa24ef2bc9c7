//! # chatflow-server
//!
//! Realtime chat server. A single axum process carries:
//! - **WebSocket protocol** for the general room, private conversations,
//!   durable named groups, and ephemeral hotspot groups
//! - **Hotspot grouping**: connections on the same private subnet are
//!   clustered into anonymous color-coded groups
//! - **REST API** for message history, edits, deletions, reactions, and
//!   search
//! - **Delivery receipts**: sent → delivered → read, relayed to the
//!   sender's live sessions
//!
//! Identity tokens are issued by an external auth service sharing
//! `JWT_SECRET`; this server only verifies them.

mod api;
mod auth;
mod config;
mod error;
mod hotspot;
mod pipeline;
mod receipts;
mod rooms;
mod sessions;
mod socket;
mod state;

use tracing::info;
use tracing_subscriber::EnvFilter;

use chatflow_store::Database;

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing first, so config loading can warn (respects RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chatflow_server=debug")),
        )
        .init();

    info!("Starting ChatFlow server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(addr = %config.http_addr, "Loaded configuration");

    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    if let Some(path) = db.path() {
        info!(path = %path.display(), "Database ready");
    }

    let http_addr = config.http_addr;
    let app_state = AppState::new(db, config);

    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
