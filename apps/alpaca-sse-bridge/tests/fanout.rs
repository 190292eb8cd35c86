//! Fan-out Integration Tests
//!
//! Tests delivery from the broadcaster to channel-backed subscribers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;
use tokio::sync::mpsc;

use alpaca_sse_bridge::{
    Broadcaster, ChannelSink, MessagePublisher, SinkRegistry, SubscriberHandle, UpstreamMessage,
};

fn setup() -> (Arc<SinkRegistry>, Broadcaster) {
    let registry = Arc::new(SinkRegistry::new());
    let broadcaster = Broadcaster::new(Arc::clone(&registry));
    (registry, broadcaster)
}

fn attach(registry: &SinkRegistry, capacity: usize) -> (SubscriberHandle, mpsc::Receiver<Arc<str>>) {
    let (sink, rx) = ChannelSink::channel(capacity);
    (registry.attach(Arc::new(sink)), rx)
}

fn drain(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<String> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|frame| frame.to_string())
        .collect()
}

#[test]
fn test_three_subscribers_then_one_detaches() {
    let (registry, broadcaster) = setup();
    let (first, mut rx_a) = attach(&registry, 16);
    let (_, mut rx_b) = attach(&registry, 16);
    let (_, mut rx_c) = attach(&registry, 16);

    let report = broadcaster.publish(&UpstreamMessage::Structured(
        json!({"T": "t", "S": "SPY", "p": 123.45}),
    ));
    assert_eq!(report.delivered, 3);

    assert!(registry.detach(first));

    let report = broadcaster.publish(&UpstreamMessage::Structured(
        json!({"T": "t", "S": "SPY", "p": 123.50}),
    ));
    assert_eq!(report.delivered, 2);

    let before = r#"{"T":"t","S":"SPY","p":123.45}"#;
    let after = r#"{"T":"t","S":"SPY","p":123.5}"#;
    assert_eq!(drain(&mut rx_a), vec![before]);
    assert_eq!(drain(&mut rx_b), vec![before, after]);
    assert_eq!(drain(&mut rx_c), vec![before, after]);
}

#[test]
fn test_raw_text_is_relayed_verbatim() {
    let (registry, broadcaster) = setup();
    let (_, mut rx) = attach(&registry, 4);

    broadcaster.publish(&UpstreamMessage::Raw("not json {".to_string()));

    assert_eq!(drain(&mut rx), vec!["not json {"]);
}

#[test]
fn test_full_subscriber_misses_frames_but_stays_attached() {
    let (registry, broadcaster) = setup();
    let (slow, mut rx_slow) = attach(&registry, 1);
    let (_, mut rx_fast) = attach(&registry, 16);

    for n in 0..3 {
        broadcaster.publish(&UpstreamMessage::Structured(json!(n)));
    }

    assert_eq!(drain(&mut rx_slow), vec!["0"]);
    assert_eq!(drain(&mut rx_fast), vec!["0", "1", "2"]);
    assert!(registry.contains(slow));
}

#[test]
fn test_dropped_receiver_is_detached_on_next_publish() {
    let (registry, broadcaster) = setup();
    let (gone, rx_gone) = attach(&registry, 4);
    let (_, mut rx_live) = attach(&registry, 4);
    drop(rx_gone);

    let report = broadcaster.publish(&UpstreamMessage::Structured(json!({"T": "t"})));

    assert_eq!(report.detached, 1);
    assert_eq!(report.delivered, 1);
    assert!(!registry.contains(gone));
    assert_eq!(drain(&mut rx_live), vec![r#"{"T":"t"}"#]);
}

#[derive(Debug, Clone)]
enum Op {
    Attach,
    Detach(usize),
    Publish,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Attach),
        1 => any::<usize>().prop_map(Op::Detach),
        2 => Just(Op::Publish),
    ]
}

struct Tracked {
    handle: SubscriberHandle,
    rx: mpsc::Receiver<Arc<str>>,
    attached: bool,
    expected: Vec<String>,
}

proptest! {
    #[test]
    fn test_attached_subscribers_receive_each_publish_once_in_order(
        ops in prop::collection::vec(op(), 1..64)
    ) {
        let (registry, broadcaster) = setup();
        let mut subscribers: Vec<Tracked> = Vec::new();
        let mut sequence = 0_u64;

        for op in ops {
            match op {
                Op::Attach => {
                    let (handle, rx) = attach(&registry, 128);
                    subscribers.push(Tracked { handle, rx, attached: true, expected: Vec::new() });
                }
                Op::Detach(i) => {
                    if !subscribers.is_empty() {
                        let idx = i % subscribers.len();
                        let tracked = &mut subscribers[idx];
                        prop_assert_eq!(registry.detach(tracked.handle), tracked.attached);
                        tracked.attached = false;
                    }
                }
                Op::Publish => {
                    sequence += 1;
                    let report = broadcaster.publish(&UpstreamMessage::Structured(json!(sequence)));
                    let live = subscribers.iter().filter(|s| s.attached).count();
                    prop_assert_eq!(report.delivered, live);
                    for tracked in subscribers.iter_mut().filter(|s| s.attached) {
                        tracked.expected.push(sequence.to_string());
                    }
                }
            }
        }

        for tracked in &mut subscribers {
            prop_assert_eq!(drain(&mut tracked.rx), tracked.expected.clone());
        }
    }
}
