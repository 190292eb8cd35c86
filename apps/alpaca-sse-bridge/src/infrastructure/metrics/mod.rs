//! Prometheus Metrics Module
//!
//! Exposes bridge metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Upstream**: Messages received by kind, reconnect attempts by cause,
//!   and whether the session is currently streaming
//! - **Fan-out**: Frames delivered, sink failures by reason, and the number
//!   of attached subscribers
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port. Recording is a
//! no-op until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::ports::PublishReport;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling this again after a successful install returns the existing handle.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

const MESSAGES_RECEIVED: &str = "alpaca_bridge_messages_received_total";
const FRAMES_DELIVERED: &str = "alpaca_bridge_frames_delivered_total";
const SINK_FAILURES: &str = "alpaca_bridge_sink_failures_total";
const RECONNECTS: &str = "alpaca_bridge_reconnects_total";
const SUBSCRIBERS: &str = "alpaca_bridge_subscribers";
const SESSION_STREAMING: &str = "alpaca_bridge_session_streaming";

fn register_metrics() {
    describe_counter!(
        MESSAGES_RECEIVED,
        "Total messages received from the upstream stream"
    );
    describe_counter!(
        FRAMES_DELIVERED,
        "Total frames handed to subscriber sinks"
    );
    describe_counter!(
        SINK_FAILURES,
        "Total frames a subscriber sink refused, by reason"
    );
    describe_counter!(
        RECONNECTS,
        "Total upstream reconnection attempts, by cause"
    );
    describe_gauge!(SUBSCRIBERS, "Number of attached subscribers");
    describe_gauge!(
        SESSION_STREAMING,
        "1 while the upstream session is streaming, else 0"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a message received from upstream (`structured` or `raw`).
pub fn record_message_received(kind: &'static str) {
    counter!(MESSAGES_RECEIVED, "kind" => kind).increment(1);
}

/// Record the outcome of one fan-out.
pub fn record_publish(report: &PublishReport) {
    if report.delivered > 0 {
        counter!(FRAMES_DELIVERED).increment(report.delivered as u64);
    }
    if report.dropped > 0 {
        counter!(SINK_FAILURES, "reason" => "full").increment(report.dropped as u64);
    }
    if report.detached > 0 {
        counter!(SINK_FAILURES, "reason" => "closed").increment(report.detached as u64);
    }
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect(cause: &'static str) {
    counter!(RECONNECTS, "cause" => cause).increment(1);
}

/// Update the attached subscriber count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribers(count: usize) {
    gauge!(SUBSCRIBERS).set(count as f64);
}

/// Update the upstream streaming flag.
pub fn set_session_streaming(streaming: bool) {
    gauge!(SESSION_STREAMING).set(if streaming { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================
