//! Upstream Session
//!
//! Owns the single WebSocket connection to Alpaca's market data stream and
//! drives it through its lifecycle:
//!
//! ```text
//! Disconnected → Connecting → Authenticating → Subscribed → Streaming
//!                    ▲                                          │
//!                    └───── (backoff delay) ◄── Reconnecting ◄──┘
//! ```
//!
//! The session declares itself streaming as soon as the subscribe request
//! is written. Upstream acknowledgments, rejections and error payloads are
//! relayed like any other frame.
//!
//! # Stream URL
//!
//! - IEX (free): `wss://stream.data.alpaca.markets/v2/iex`
//! - SIP: `wss://stream.data.alpaca.markets/v2/sip`

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, JsonCodec};
use super::messages::{AuthRequest, SubscribeRequest};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::MessagePublisher;
use crate::domain::streaming::{SessionState, UpstreamMessage};
use crate::infrastructure::config::{BridgeConfig, Credentials};
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Reasons an upstream connection ended. All of them lead to a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// WebSocket transport or protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Outbound control message could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Upstream sent a close frame.
    #[error("upstream closed the connection (code {code}): {reason}")]
    ClosedByRemote {
        /// Close code, 1005 if none was given.
        code: u16,
        /// Close reason text.
        reason: String,
    },

    /// Stream ended without a close frame.
    #[error("upstream stream ended")]
    StreamEnded,
}

impl SessionError {
    fn closed_by_remote(frame: Option<CloseFrame>) -> Self {
        frame.map_or(
            Self::ClosedByRemote {
                code: 1005,
                reason: String::new(),
            },
            |frame| Self::ClosedByRemote {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().to_owned(),
            },
        )
    }

    /// Short label used in metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::WebSocket(_) => "websocket",
            Self::Codec(_) => "codec",
            Self::ClosedByRemote { .. } => "remote_close",
            Self::StreamEnded => "stream_ended",
        }
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Configuration for the upstream session.
#[derive(Debug, Clone)]
pub struct UpstreamSessionConfig {
    /// WebSocket URL.
    pub url: String,
    /// API credentials.
    pub credentials: Credentials,
    /// Symbols to subscribe to for trades.
    pub symbols: Vec<String>,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl UpstreamSessionConfig {
    /// Create a new configuration with the default backoff policy.
    #[must_use]
    pub fn new(url: String, credentials: Credentials, symbols: Vec<String>) -> Self {
        Self {
            url,
            credentials,
            symbols,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Override the backoff policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

impl From<&BridgeConfig> for UpstreamSessionConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            url: config.upstream.url.clone(),
            credentials: config.credentials.clone(),
            symbols: config.upstream.symbols.clone(),
            reconnect: ReconnectConfig::from(&config.reconnect),
        }
    }
}

// =============================================================================
// Session Statistics
// =============================================================================

/// Counters describing the session's history.
#[derive(Debug, Default)]
pub struct SessionStats {
    messages_received: AtomicU64,
    reconnect_attempts: AtomicU64,
    last_reconnect_delay_ms: AtomicU64,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
}

impl SessionStats {
    fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    fn record_streaming(&self) {
        *self.last_connected_at.write() = Some(Utc::now());
        *self.last_error.write() = None;
    }

    fn record_failure(&self, error: &SessionError, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.last_reconnect_delay_ms.store(millis, Ordering::Relaxed);
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write() = Some(error.to_string());
    }

    /// Payloads received since start.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Reconnects scheduled since start.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Backoff applied before the most recent reconnect.
    #[must_use]
    pub fn last_reconnect_delay(&self) -> Option<Duration> {
        (self.reconnect_attempts() > 0)
            .then(|| Duration::from_millis(self.last_reconnect_delay_ms.load(Ordering::Relaxed)))
    }

    /// When the session last reached streaming.
    #[must_use]
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connected_at.read()
    }

    /// Cause of the most recent disconnect, cleared on reconnect.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}

// =============================================================================
// Upstream Session
// =============================================================================

/// Upstream WebSocket session for market data.
///
/// Manages the connection lifecycle including:
/// - Authentication and subscription on every connect
/// - Relaying every inbound frame to the publisher
/// - Automatic reconnection with exponential backoff
///
/// The transport is owned by [`run`](Self::run) and never leaves it, so at
/// most one socket exists at a time.
pub struct UpstreamSession {
    config: UpstreamSessionConfig,
    codec: JsonCodec,
    publisher: Arc<dyn MessagePublisher>,
    state: watch::Sender<SessionState>,
    stats: Arc<SessionStats>,
    cancel: CancellationToken,
}

impl UpstreamSession {
    /// Create a new session. Nothing happens until [`run`](Self::run).
    #[must_use]
    pub fn new(
        config: UpstreamSessionConfig,
        publisher: Arc<dyn MessagePublisher>,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            codec: JsonCodec::new(),
            publisher,
            state,
            stats: Arc::new(SessionStats::default()),
            cancel,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Session counters.
    #[must_use]
    pub const fn stats(&self) -> &Arc<SessionStats> {
        &self.stats
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &UpstreamSessionConfig {
        &self.config
    }

    /// Run the connection loop until cancelled.
    ///
    /// Transport failures never escape: each one schedules a reconnect
    /// after the current backoff delay.
    pub async fn run(self: Arc<Self>) {
        let mut backoff = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            let cause = match self.connect_and_stream(&mut backoff).await {
                Ok(()) => break,
                Err(e) => e,
            };

            let delay = backoff.next_delay();
            self.stats.record_failure(&cause, delay);
            self.transition(SessionState::Reconnecting);
            metrics::record_reconnect(cause.kind());

            tracing::warn!(
                error = %cause,
                attempt = backoff.attempt_count(),
                delay_ms = delay.as_millis(),
                "Upstream connection lost, reconnecting"
            );

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(SessionState::Disconnected);
        tracing::info!("Upstream session stopped");
    }

    /// Connect, authenticate, subscribe and relay until the transport fails.
    ///
    /// Returns `Ok(())` only when cancelled.
    async fn connect_and_stream(&self, backoff: &mut ReconnectPolicy) -> Result<(), SessionError> {
        self.transition(SessionState::Connecting);
        tracing::info!(url = %self.config.url, "Connecting to upstream feed");

        let (ws_stream, _response) = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(self.config.url.as_str()) => result?,
        };
        let (mut write, mut read) = ws_stream.split();

        self.transition(SessionState::Authenticating);
        let auth = self
            .codec
            .encode(&AuthRequest::from_credentials(&self.config.credentials))?;
        write.send(Message::Text(auth.into())).await?;

        let subscribe = self
            .codec
            .encode(&SubscribeRequest::trades(self.config.symbols.clone()))?;
        write.send(Message::Text(subscribe.into())).await?;
        self.transition(SessionState::Subscribed);

        // No upstream ack is awaited before streaming.
        self.transition(SessionState::Streaming);
        backoff.reset();
        self.stats.record_streaming();
        tracing::info!(
            symbols = %self.config.symbols.join(","),
            "Streaming upstream feed"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.relay(&self.codec.decode(text.as_str()));
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            self.relay(&self.codec.decode_bytes(&bytes));
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Err(SessionError::closed_by_remote(frame));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(SessionError::StreamEnded),
                    }
                }
            }
        }
    }

    /// Hand one inbound payload to the publisher.
    fn relay(&self, message: &UpstreamMessage) {
        self.stats.record_message();
        metrics::record_message_received(message.kind());

        let report = self.publisher.publish(message);
        tracing::trace!(
            kind = message.kind(),
            delivered = report.delivered,
            "Relayed upstream message"
        );
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        debug_assert!(
            previous.can_transition_to(next),
            "invalid session transition {previous} -> {next}"
        );
        metrics::set_session_streaming(next.is_streaming());
    }
}
