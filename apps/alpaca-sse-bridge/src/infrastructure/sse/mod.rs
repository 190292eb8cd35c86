//! Server-Sent Events Adapter
//!
//! Turns a bridge subscription into an SSE response. Each client gets a
//! bounded channel; the sending half is registered with the bridge as a
//! [`FrameSink`] and the receiving half drives the response stream.
//!
//! ```text
//! : connected
//!
//! data: [{"T":"t","S":"SPY","p":123.45}]
//!
//! : ping 1735689600000
//! ```

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::application::ports::{FrameSink, SinkError};
use crate::domain::subscriber::SubscriberHandle;
use crate::infrastructure::bridge::Bridge;
use crate::infrastructure::server::AppState;

// =============================================================================
// Channel Sink
// =============================================================================

/// Frame sink backed by a bounded `mpsc` channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn send_frame(&self, frame: Arc<str>) -> Result<(), SinkError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

// =============================================================================
// Subscriber Stream
// =============================================================================

/// Detaches the subscriber when the response stream is dropped.
struct SubscriberGuard {
    bridge: Arc<Bridge>,
    handle: SubscriberHandle,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.bridge.unregister_subscriber(self.handle);
    }
}

struct StreamState {
    rx: mpsc::Receiver<Arc<str>>,
    keepalive: Interval,
    _guard: SubscriberGuard,
}

/// Register a new subscriber and return its SSE event stream.
///
/// The stream opens with a `connected` comment, then yields one `data`
/// event per broadcast frame and a `ping <unix-millis>` comment every
/// `keepalive`. It ends when the bridge drops the sink, and dropping it
/// detaches the subscriber.
pub fn subscribe(
    bridge: &Arc<Bridge>,
    buffer: usize,
    keepalive: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let (sink, rx) = ChannelSink::channel(buffer);
    let handle = bridge.register_subscriber(Arc::new(sink));

    let mut keepalive = tokio::time::interval_at(Instant::now() + keepalive, keepalive);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = StreamState {
        rx,
        keepalive,
        _guard: SubscriberGuard {
            bridge: Arc::clone(bridge),
            handle,
        },
    };

    let frames = stream::unfold(state, |mut state| async move {
        let event = tokio::select! {
            biased;
            frame = state.rx.recv() => Event::default().data(&*frame?),
            _ = state.keepalive.tick() => ping_event(),
        };
        Some((Ok(event), state))
    });

    stream::once(async { Ok(Event::default().comment("connected")) }).chain(frames)
}

fn ping_event() -> Event {
    Event::default().comment(format!("ping {}", Utc::now().timestamp_millis()))
}

// =============================================================================
// HTTP Handler
// =============================================================================

/// Query parameters accepted by `GET /stream`.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Access token, checked against `PROXY_TOKEN`.
    pub token: Option<String>,
}

/// `GET /stream`: attach the caller as a subscriber.
pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> Response {
    if !state.authorize(query.token.as_deref()) {
        tracing::warn!("Rejected stream request with invalid token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "unauthorized" })),
        )
            .into_response();
    }

    let events = subscribe(
        &state.bridge,
        state.subscriber_buffer,
        state.keepalive_interval,
    );

    ([(header::CACHE_CONTROL, "no-store")], Sse::new(events)).into_response()
}
