//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chatflow_shared::constants::{DEFAULT_AUTH_TIMEOUT_SECS, DEFAULT_HTTP_PORT};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP/WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3002`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database. When unset the platform
    /// data directory is used.
    /// Env: `DATABASE_PATH`
    pub database_path: Option<PathBuf>,

    /// HMAC secret used to verify bearer tokens. Token issuance happens in
    /// an external auth service sharing the same secret.
    /// Env: `JWT_SECRET`
    /// Default: a development-only placeholder.
    pub jwt_secret: String,

    /// How long a fresh connection may stay unauthenticated before it is
    /// closed.
    /// Env: `AUTH_TIMEOUT_SECS`
    /// Default: 5 seconds.
    pub auth_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            jwt_secret: "chatflow-dev-secret-change-in-production".to_string(),
            auth_timeout: Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            if !secret.is_empty() {
                config.jwt_secret = secret;
            }
        } else {
            tracing::warn!("JWT_SECRET not set, using development default");
        }

        if let Ok(val) = std::env::var("AUTH_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.auth_timeout = Duration::from_secs(secs);
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
