//! Bridge Supervisor
//!
//! Owns the one upstream session together with the subscriber registry and
//! the broadcaster that feeds it. HTTP handlers only ever see the bridge:
//! they attach a sink, detach it when the client goes away, and read state
//! for health reporting.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FrameSink, MessagePublisher};
use crate::application::services::{Broadcaster, SinkRegistry};
use crate::domain::streaming::SessionState;
use crate::domain::subscriber::SubscriberHandle;
use crate::infrastructure::alpaca::{SessionStats, UpstreamSession, UpstreamSessionConfig};
use crate::infrastructure::metrics;

/// Supervisor for the upstream session and its downstream subscribers.
pub struct Bridge {
    registry: Arc<SinkRegistry>,
    broadcaster: Arc<Broadcaster>,
    session: Arc<UpstreamSession>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    /// Build the registry, broadcaster and session without connecting.
    #[must_use]
    pub fn new(config: UpstreamSessionConfig) -> Self {
        let registry = Arc::new(SinkRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry)));
        let cancel = CancellationToken::new();
        let publisher: Arc<dyn MessagePublisher> = broadcaster.clone();
        let session = Arc::new(UpstreamSession::new(config, publisher, cancel.clone()));

        Self {
            registry,
            broadcaster,
            session,
            cancel,
            task: Mutex::new(None),
        }
    }

    /// Build a bridge and start its session. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(config: UpstreamSessionConfig) -> Arc<Self> {
        let bridge = Arc::new(Self::new(config));
        bridge.start();
        bridge
    }

    /// Spawn the session task. Later calls are no-ops.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        tracing::info!(
            url = %self.session.config().url,
            symbols = ?self.session.config().symbols,
            "Starting upstream session"
        );
        *task = Some(tokio::spawn(Arc::clone(&self.session).run()));
    }

    /// Attach a subscriber sink. It receives every message published from now on.
    pub fn register_subscriber(&self, sink: Arc<dyn FrameSink>) -> SubscriberHandle {
        let handle = self.registry.attach(sink);
        let count = self.registry.len();
        metrics::set_subscribers(count);
        tracing::info!(subscriber = %handle, subscribers = count, "Subscriber attached");
        handle
    }

    /// Detach a subscriber. Unknown or already-detached handles are ignored.
    pub fn unregister_subscriber(&self, handle: SubscriberHandle) {
        if self.registry.detach(handle) {
            let count = self.registry.len();
            metrics::set_subscribers(count);
            tracing::info!(subscriber = %handle, subscribers = count, "Subscriber detached");
        }
    }

    /// Current upstream session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Subscribe to upstream session state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.session.watch_state()
    }

    /// Upstream session counters.
    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        self.session.stats()
    }

    /// Number of attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// The broadcaster feeding the registry.
    #[must_use]
    pub const fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Whether the session task has been started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Stop the session, wait for it to close the socket, and detach every subscriber.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "Upstream session task failed");
        }

        let detached = self.registry.clear();
        metrics::set_subscribers(0);
        tracing::info!(detached, "Bridge stopped");
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .field("subscribers", &self.subscriber_count())
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}
