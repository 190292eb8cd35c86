//! Port Interfaces
//!
//! Defines the interfaces (ports) between the relay core and the outside
//! world, following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FrameSink`: one downstream connection the broadcaster writes frames to
//!
//! ## Driver Ports (Inbound)
//!
//! - `MessagePublisher`: entry point the upstream session feeds payloads into

use std::sync::Arc;

use crate::domain::streaming::UpstreamMessage;

/// Reasons a sink could not accept a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The subscriber's buffer is full; this frame is lost for it.
    #[error("subscriber buffer is full")]
    Full,
    /// The subscriber's connection is gone.
    #[error("subscriber connection is closed")]
    Closed,
}

/// Something the broadcaster can write an outbound frame to.
///
/// Implementations must not block: a write either completes immediately or
/// fails with a [`SinkError`].
#[cfg_attr(test, mockall::automock)]
pub trait FrameSink: Send + Sync {
    /// Write one frame.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Full`] if the frame cannot be buffered and
    /// [`SinkError::Closed`] if the subscriber has gone away.
    fn send_frame(&self, frame: Arc<str>) -> Result<(), SinkError>;
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Sinks that accepted the frame.
    pub delivered: usize,
    /// Sinks that were full and skipped this frame.
    pub dropped: usize,
    /// Sinks found closed and removed from the registry.
    pub detached: usize,
}

impl PublishReport {
    /// Total sinks the frame was offered to.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.delivered + self.dropped + self.detached
    }
}

/// Receives every payload relayed from upstream.
pub trait MessagePublisher: Send + Sync {
    /// Distribute one message to all current subscribers. Never fails.
    fn publish(&self, message: &UpstreamMessage) -> PublishReport;
}
