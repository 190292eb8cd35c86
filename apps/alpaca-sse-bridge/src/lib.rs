#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Alpaca SSE Bridge - Market Data Relay
//!
//! Maintains a single authenticated connection to Alpaca's market data
//! WebSocket and re-broadcasts every message it receives to any number of
//! Server-Sent Events clients.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core relay types with no I/O
//!   - `streaming`: Upstream message and session state
//!   - `subscriber`: Subscriber handles and the copy-on-read registry
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Frame sinks and the message publisher interface
//!   - `services`: The fan-out broadcaster
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `alpaca`: Upstream WebSocket session with reconnect/backoff
//!   - `bridge`: Supervisor owning the session, registry and broadcaster
//!   - `sse`: Channel-backed sinks and the SSE response stream
//!   - `server`: HTTP router and server
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                                              ┌──► SSE client 1
//! Alpaca WS ──► UpstreamSession ──► Broadcaster ┼──► SSE client 2
//!                                              └──► SSE client N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{SessionState, UpstreamMessage};
pub use domain::subscriber::{SubscriberHandle, SubscriberRegistry};

// Ports and services
pub use application::ports::{FrameSink, MessagePublisher, PublishReport, SinkError};
pub use application::services::{Broadcaster, SinkRegistry};

// Infrastructure config
pub use infrastructure::config::{BridgeConfig, ConfigError, Credentials};

// Upstream session
pub use infrastructure::alpaca::{
    ReconnectConfig, SessionError, SessionStats, UpstreamSession, UpstreamSessionConfig,
};

// Bridge and HTTP surface
pub use infrastructure::bridge::Bridge;
pub use infrastructure::server::{AppState, BridgeServer, ServerError, router};
pub use infrastructure::sse::ChannelSink;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
