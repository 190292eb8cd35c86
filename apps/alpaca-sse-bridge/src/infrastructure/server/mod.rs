//! HTTP Server
//!
//! Single axum router serving the SSE stream alongside health and metrics.
//!
//! # Endpoints
//!
//! - `GET /` - Plain `ok`
//! - `GET /stream` - Server-Sent Events relay (`?token=` when `PROXY_TOKEN` is set)
//! - `GET /health` - JSON health status
//! - `GET /healthz` - Liveness probe
//! - `GET /readyz` - Readiness probe (ready while streaming)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::infrastructure::bridge::Bridge;
use crate::infrastructure::config::BridgeConfig;
use crate::infrastructure::health::{
    health_handler, liveness_handler, metrics_handler, readiness_handler,
};
use crate::infrastructure::sse::stream_handler;

// =============================================================================
// Shared State
// =============================================================================

/// Shared state for all HTTP handlers.
pub struct AppState {
    /// The bridge subscribers attach to.
    pub bridge: Arc<Bridge>,
    /// Token required on `/stream`, if any.
    pub access_token: Option<String>,
    /// Interval between keep-alive comments.
    pub keepalive_interval: Duration,
    /// Per-subscriber channel capacity.
    pub subscriber_buffer: usize,
    /// Service version reported by `/health`.
    pub version: String,
    /// Process start, for uptime.
    pub started_at: Instant,
}

impl AppState {
    /// Create state from the bridge and its configuration.
    #[must_use]
    pub fn new(bridge: Arc<Bridge>, config: &BridgeConfig) -> Self {
        Self {
            bridge,
            access_token: config.server.access_token.clone(),
            keepalive_interval: config.stream.keepalive_interval,
            subscriber_buffer: config.stream.subscriber_buffer,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        }
    }

    /// Check a presented token. Everything passes when no token is configured.
    #[must_use]
    pub fn authorize(&self, presented: Option<&str>) -> bool {
        self.access_token
            .as_deref()
            .is_none_or(|expected| presented == Some(expected))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("bridge", &self.bridge)
            .field("token_required", &self.access_token.is_some())
            .field("keepalive_interval", &self.keepalive_interval)
            .field("subscriber_buffer", &self.subscriber_buffer)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build the router with every endpoint and a permissive CORS layer.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(AllowOrigin::mirror_request());

    Router::new()
        .route("/", get(root_handler))
        .route("/stream", get(stream_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .with_state(state)
}

async fn root_handler() -> &'static str {
    "ok"
}

// =============================================================================
// Server
// =============================================================================

/// HTTP server for the bridge.
pub struct BridgeServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl BridgeServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::BindFailed` if the port cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))
    }

    /// Serve on an already-bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ServerFailed` if the HTTP server fails while running.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let port = listener.local_addr().map_or(self.port, |a| a.port());
        tracing::info!(port, "Bridge listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Bind and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
