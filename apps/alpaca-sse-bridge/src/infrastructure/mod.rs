//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Alpaca WebSocket session adapter.
pub mod alpaca;

/// Bridge supervisor wiring the session, broadcaster and registry.
pub mod bridge;

/// Configuration and dependency injection.
pub mod config;

/// Health check and metrics HTTP endpoints.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// HTTP server (router, CORS, graceful shutdown).
pub mod server;

/// Server-Sent Events downstream endpoint.
pub mod sse;

/// OpenTelemetry tracing integration.
pub mod telemetry;
