//! Observer server startup helper for embedding in the engine binary.
//!
//! Provides [`spawn_observer`] which launches the Observer HTTP +
//! `WebSocket` server on a background Tokio task. The engine binary calls
//! this during startup so the Observer API runs concurrently with the
//! control loop.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the Observer HTTP server on a background Tokio task.
///
/// Binds to `0.0.0.0:{port}` and serves the snapshot REST API, the
/// control endpoints, and the `WebSocket` step stream. Returns a
/// [`JoinHandle`] so the caller can manage the server's lifecycle
/// alongside the control loop.
///
/// The server runs until the Tokio runtime is shut down or the task is
/// aborted. The caller should hold the returned handle and abort or
/// await it during clean shutdown.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the bind address is obviously
/// malformed. Bind failures on a busy port surface asynchronously in the
/// server task's log output.
pub async fn spawn_observer(
    port: u16,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    let config = ServerConfig {
        host: String::from("0.0.0.0"),
        port,
    };

    // Catch obvious misconfigurations before spawning the background
    // task; the actual bind happens inside start_server.
    let addr_str = format!("{}:{}", config.host, config.port);
    let _: std::net::SocketAddr = addr_str.parse().map_err(|e| {
        StartupError::Server(ServerError::Bind(format!("invalid address {addr_str}: {e}")))
    })?;

    let handle = tokio::spawn(async move {
        if let Err(e) = crate::server::start_server(&config, state).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(port, "Observer server spawned on background task");

    Ok(handle)
}
