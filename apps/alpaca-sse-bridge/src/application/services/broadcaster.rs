//! Fan-out broadcaster.
//!
//! Converts each upstream message to its outbound text once and offers the
//! shared frame to every sink in a registry snapshot. One failing sink never
//! stops the rest.
//!
//! A full sink is logged once when it starts dropping frames and once more,
//! with the number missed, when it accepts a frame again.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::ports::{FrameSink, MessagePublisher, PublishReport, SinkError};
use crate::domain::streaming::UpstreamMessage;
use crate::domain::subscriber::{SubscriberHandle, SubscriberRegistry};
use crate::infrastructure::metrics;

/// Registry of downstream frame sinks.
pub type SinkRegistry = SubscriberRegistry<dyn FrameSink>;

/// Writes every published message to all registered sinks.
#[derive(Debug)]
pub struct Broadcaster {
    registry: Arc<SinkRegistry>,
    /// Frames dropped per subscriber since its buffer last had room.
    lagging: Mutex<HashMap<SubscriberHandle, u64>>,
}

impl Broadcaster {
    /// Create a broadcaster over the given registry.
    #[must_use]
    pub fn new(registry: Arc<SinkRegistry>) -> Self {
        Self {
            registry,
            lagging: Mutex::new(HashMap::new()),
        }
    }

    /// Number of subscribers currently dropping frames.
    #[must_use]
    pub fn lagging_subscribers(&self) -> usize {
        self.lagging.lock().len()
    }

    /// The registry this broadcaster reads from.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SinkRegistry> {
        &self.registry
    }
}

impl MessagePublisher for Broadcaster {
    fn publish(&self, message: &UpstreamMessage) -> PublishReport {
        let frame = message.to_frame();
        let mut report = PublishReport::default();
        let mut lagging = self.lagging.lock();

        for (handle, sink) in self.registry.snapshot() {
            match sink.send_frame(Arc::clone(&frame)) {
                Ok(()) => {
                    report.delivered += 1;
                    if !lagging.is_empty()
                        && let Some(missed) = lagging.remove(&handle)
                    {
                        tracing::warn!(subscriber = %handle, lagged = missed, "Subscriber lagged");
                    }
                }
                Err(SinkError::Full) => {
                    report.dropped += 1;
                    let missed = lagging.entry(handle).or_insert(0);
                    *missed += 1;
                    if *missed == 1 {
                        tracing::warn!(subscriber = %handle, "Subscriber buffer full, dropping frames");
                    }
                }
                Err(SinkError::Closed) => {
                    report.detached += 1;
                    self.registry.detach(handle);
                    let missed = lagging.remove(&handle).unwrap_or(0);
                    tracing::debug!(subscriber = %handle, lagged = missed, "Subscriber closed, detached");
                }
            }
        }

        // Subscribers unregistered elsewhere while lagging.
        if !lagging.is_empty() {
            lagging.retain(|handle, _| self.registry.contains(*handle));
        }
        drop(lagging);

        metrics::record_publish(&report);
        if report.detached > 0 {
            metrics::set_subscribers(self.registry.len());
        }

        report
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use mockall::predicate::function;
    use serde_json::json;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    use super::*;
    use crate::application::ports::MockFrameSink;
    use crate::infrastructure::sse::ChannelSink;

    /// Counts warn events and remembers the last `lagged` value seen.
    #[derive(Clone, Default)]
    struct WarnCapture {
        warnings: Arc<AtomicUsize>,
        lagged: Arc<AtomicU64>,
    }

    impl Visit for WarnCapture {
        fn record_u64(&mut self, field: &Field, value: u64) {
            if field.name() == "lagged" {
                self.lagged.store(value, Ordering::Relaxed);
            }
        }

        fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
    }

    impl<S: tracing::Subscriber> Layer<S> for WarnCapture {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.warnings.fetch_add(1, Ordering::Relaxed);
                event.record(&mut self.clone());
            }
        }
    }

    fn accepting_sink(expected: &'static str) -> MockFrameSink {
        let mut sink = MockFrameSink::new();
        sink.expect_send_frame()
            .with(function(move |frame: &Arc<str>| &**frame == expected))
            .times(1)
            .returning(|_| Ok(()));
        sink
    }

    fn failing_sink(error: SinkError) -> MockFrameSink {
        let mut sink = MockFrameSink::new();
        sink.expect_send_frame().times(1).returning(move |_| Err(error));
        sink
    }

    #[test]
    fn publish_reaches_every_sink() {
        let registry = Arc::new(SinkRegistry::new());
        for _ in 0..3 {
            registry.attach(Arc::new(accepting_sink(r#"{"T":"t","S":"SPY"}"#)));
        }
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        let report =
            broadcaster.publish(&UpstreamMessage::Structured(json!({"T": "t", "S": "SPY"})));

        assert_eq!(report.delivered, 3);
        assert_eq!(report.attempted(), 3);
    }

    #[test]
    fn raw_payload_is_written_unchanged() {
        let registry = Arc::new(SinkRegistry::new());
        registry.attach(Arc::new(accepting_sink("hello, not json")));
        let broadcaster = Broadcaster::new(registry);

        let report = broadcaster.publish(&UpstreamMessage::Raw("hello, not json".to_string()));
        assert_eq!(report.delivered, 1);
    }

    #[test]
    fn failing_sink_does_not_abort_fanout() {
        let registry = Arc::new(SinkRegistry::new());
        registry.attach(Arc::new(accepting_sink("x")));
        registry.attach(Arc::new(failing_sink(SinkError::Full)));
        registry.attach(Arc::new(accepting_sink("x")));
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        let report = broadcaster.publish(&UpstreamMessage::Raw("x".to_string()));

        assert_eq!(
            report,
            PublishReport {
                delivered: 2,
                dropped: 1,
                detached: 0,
            }
        );
        // Full sinks stay attached
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn closed_sink_is_detached() {
        let registry = Arc::new(SinkRegistry::new());
        let closed = registry.attach(Arc::new(failing_sink(SinkError::Closed)));
        let open = registry.attach(Arc::new(accepting_sink("x")));
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        let report = broadcaster.publish(&UpstreamMessage::Raw("x".to_string()));

        assert_eq!(report.detached, 1);
        assert!(!registry.contains(closed));
        assert!(registry.contains(open));
    }

    #[test]
    fn publish_with_no_subscribers_is_empty_report() {
        let broadcaster = Broadcaster::new(Arc::new(SinkRegistry::new()));
        let report = broadcaster.publish(&UpstreamMessage::Raw("x".to_string()));
        assert_eq!(report, PublishReport::default());
    }

    #[test]
    fn full_sink_warns_once_per_burst_with_missed_count() {
        let registry = Arc::new(SinkRegistry::new());
        let (sink, mut rx) = ChannelSink::channel(1);
        let handle = registry.attach(Arc::new(sink));
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let capture = WarnCapture::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            for n in 0..1000 {
                broadcaster.publish(&UpstreamMessage::Structured(json!(n)));
            }
            assert_eq!(capture.warnings.load(Ordering::Relaxed), 1);
            assert_eq!(broadcaster.lagging_subscribers(), 1);

            assert_eq!(&*rx.try_recv().unwrap(), "0");
            let report = broadcaster.publish(&UpstreamMessage::Raw("next".to_string()));
            assert_eq!(report.delivered, 1);
        });

        assert_eq!(capture.warnings.load(Ordering::Relaxed), 2);
        assert_eq!(capture.lagged.load(Ordering::Relaxed), 999);
        assert_eq!(broadcaster.lagging_subscribers(), 0);
        assert!(registry.contains(handle));
    }

    #[test]
    fn lagging_entry_is_forgotten_after_unregister() {
        let registry = Arc::new(SinkRegistry::new());
        let (sink, _rx) = ChannelSink::channel(1);
        let handle = registry.attach(Arc::new(sink));
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        broadcaster.publish(&UpstreamMessage::Raw("a".to_string()));
        broadcaster.publish(&UpstreamMessage::Raw("b".to_string()));
        assert_eq!(broadcaster.lagging_subscribers(), 1);

        assert!(registry.detach(handle));
        broadcaster.publish(&UpstreamMessage::Raw("c".to_string()));
        assert_eq!(broadcaster.lagging_subscribers(), 0);
    }
}
