//! Market Data Streaming Types
//!
//! The relay unit received from the upstream feed and the lifecycle states
//! of the single upstream session. Message content is never interpreted
//! beyond the structured/raw distinction.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

// =============================================================================
// Upstream Message
// =============================================================================

/// A payload received from the upstream feed.
///
/// Lives only for the duration of one broadcast.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamMessage {
    /// Payload that decoded as a JSON document.
    Structured(Value),
    /// Payload that did not decode, relayed exactly as received.
    Raw(String),
}

impl UpstreamMessage {
    /// Canonical outbound text for this message.
    ///
    /// Structured values are re-serialized as compact JSON (key order is
    /// preserved). Raw payloads pass through unchanged.
    #[must_use]
    pub fn to_frame_text(&self) -> String {
        match self {
            Self::Structured(value) => value.to_string(),
            Self::Raw(text) => text.clone(),
        }
    }

    /// Canonical outbound text as a shareable frame.
    #[must_use]
    pub fn to_frame(&self) -> Arc<str> {
        Arc::from(self.to_frame_text())
    }

    /// Whether the payload decoded as JSON.
    #[must_use]
    pub const fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::Raw(_) => "raw",
        }
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of the upstream session.
///
/// ```text
/// Disconnected → Connecting → Authenticating → Subscribed → Streaming
///                    ▲                                          │
///                    └────────────── Reconnecting ◄─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No socket and no pending attempt.
    #[default]
    Disconnected,
    /// Transport connect in progress.
    Connecting,
    /// Transport open, credentials being sent.
    Authenticating,
    /// Subscription request sent.
    Subscribed,
    /// Relaying inbound payloads.
    Streaming,
    /// Transport released, waiting out the backoff delay.
    Reconnecting,
}

impl SessionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Subscribed => "subscribed",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
        }
    }

    /// Check if payloads are currently being relayed.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// Check if a transport is (or is about to be) open.
    #[must_use]
    pub const fn has_transport(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Authenticating | Self::Subscribed | Self::Streaming
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Any state may fall into `Reconnecting` or `Disconnected` (shutdown).
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected | Self::Reconnecting, Self::Connecting)
                | (Self::Connecting, Self::Authenticating)
                | (Self::Authenticating, Self::Subscribed)
                | (Self::Subscribed, Self::Streaming)
                | (_, Self::Reconnecting | Self::Disconnected)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================
