//! HTTP transport: dispatch front door and server lifecycle.
//!
//! The router is deliberately minimal - the SSE route, the submission route
//! and a plain 404 fallback. Handlers receive the raw axum primitives so the
//! event stream can run indefinitely and the submission endpoint can send
//! exactly one terminal acknowledgement.

use crate::error::{ServerError, ServerResult};
use crate::protocol::ProtocolEngine;
use crate::transport::session::SessionRegistry;
use crate::transport::sse::{AppState, event_stream, post_message};
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// HTTP transport for the MCP server.
///
/// Owns the session registry and serves both transport endpoints over one
/// listener until shutdown.
pub struct HttpTransport {
    engine: Arc<ProtocolEngine>,
    registry: SessionRegistry,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
    /// Path of the event-stream endpoint
    sse_path: String,
    /// Path of the submission endpoint
    messages_path: String,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(
        engine: Arc<ProtocolEngine>,
        host: impl Into<String>,
        port: u16,
        sse_path: impl Into<String>,
        messages_path: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            registry: SessionRegistry::new(),
            host: host.into(),
            port,
            sse_path: sse_path.into(),
            messages_path: messages_path.into(),
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The shared session registry (exposed for tests and introspection).
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Build the router: event stream, submissions, 404 for everything else.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            engine: self.engine.clone(),
            messages_path: self.messages_path.clone(),
        };

        Router::new()
            .route(&self.sse_path, get(event_stream))
            .route(&self.messages_path, post(post_message))
            .fallback(not_found)
            .with_state(state)
    }

    /// Bind and serve until a shutdown signal arrives.
    pub async fn run(&self) -> ServerResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting MCP server with SSE transport on {}", bind_addr);

        let app = self.router();

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ServerError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(
            sse = %self.sse_path,
            messages = %self.messages_path,
            "MCP endpoints ready"
        );

        // Graceful shutdown: open event streams may keep the server alive
        // indefinitely, so force exit after a timeout once the shutdown
        // signal is received
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(ServerError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {
                // Timeout or second signal reached - server will be dropped
            }
        }

        info!(open_sessions = self.registry.len(), "Transport stopped");
        Ok(())
    }
}

/// Fallback for requests that match neither transport endpoint.
async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
