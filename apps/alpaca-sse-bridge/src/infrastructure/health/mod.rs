//! Health Check and Metrics Handlers
//!
//! Connection status reporting and Prometheus metrics, used by container
//! orchestrators, load balancers, and monitoring systems. The routes are
//! mounted by the HTTP server next to the SSE stream.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::streaming::SessionState;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::server::AppState;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Bridge version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream session status.
    pub upstream: UpstreamInfo,
    /// Attached subscriber count.
    pub subscribers: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Upstream is streaming.
    Healthy,
    /// Upstream is connecting or recovering.
    Degraded,
    /// Upstream is not running.
    Unhealthy,
}

impl From<SessionState> for HealthStatus {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Streaming => Self::Healthy,
            SessionState::Connecting
            | SessionState::Authenticating
            | SessionState::Subscribed
            | SessionState::Reconnecting => Self::Degraded,
            SessionState::Disconnected => Self::Unhealthy,
        }
    }
}

/// Upstream session status.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamInfo {
    /// Lifecycle state.
    pub state: SessionState,
    /// Whether an upstream socket is open or being opened.
    pub connected: bool,
    /// Messages received since start.
    pub messages_received: u64,
    /// Reconnect attempts since start.
    pub reconnect_attempts: u64,
    /// When the session last reached streaming.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent transport failure.
    pub last_error: Option<String>,
    /// Backoff applied before the most recent reconnect.
    pub last_reconnect_delay_ms: Option<u64>,
}

// =============================================================================
// HTTP Handlers
// =============================================================================

/// `GET /health`
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

/// `GET /healthz`
pub async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// `GET /readyz`
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.bridge.state().is_streaming() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let session_state = state.bridge.state();
    let stats = state.bridge.stats();

    HealthResponse {
        status: HealthStatus::from(session_state),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        upstream: UpstreamInfo {
            state: session_state,
            connected: session_state.has_transport(),
            messages_received: stats.messages_received(),
            reconnect_attempts: stats.reconnect_attempts(),
            last_connected_at: stats.last_connected_at(),
            last_error: stats.last_error(),
            last_reconnect_delay_ms: stats
                .last_reconnect_delay()
                .map(|delay| u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)),
        },
        subscribers: state.bridge.subscriber_count(),
    }
}

// =============================================================================
// Tests
// =============================================================================
