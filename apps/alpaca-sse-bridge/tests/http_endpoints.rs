//! HTTP Endpoint Integration Tests
//!
//! Drives the router directly with `tower::ServiceExt::oneshot`. The bridge
//! is never started, so the upstream session stays disconnected.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode, header};
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::time::timeout;
use tower::ServiceExt;

use alpaca_sse_bridge::{
    AppState, Bridge, BridgeConfig, MessagePublisher, UpstreamMessage, UpstreamSessionConfig,
    init_metrics, router,
};

const WAIT: Duration = Duration::from_secs(5);

fn setup(extra: &[(&str, &str)]) -> (Arc<AppState>, Arc<Bridge>) {
    let mut pairs = vec![("ALPACA_KEY", "key"), ("ALPACA_SECRET", "secret")];
    pairs.extend_from_slice(extra);
    let config = BridgeConfig::from_lookup(|key| {
        pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| (*v).to_string())
    })
    .unwrap();

    let bridge = Arc::new(Bridge::new(UpstreamSessionConfig::from(&config)));
    let state = Arc::new(AppState::new(Arc::clone(&bridge), &config));
    (state, bridge)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(body: Body) -> Bytes {
    axum::body::to_bytes(body, usize::MAX).await.unwrap()
}

async fn next_chunk<S>(stream: &mut S) -> String
where
    S: futures::Stream<Item = Result<Bytes, axum::Error>> + Unpin,
{
    let chunk = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
    String::from_utf8(chunk.to_vec()).unwrap()
}

#[tokio::test]
async fn test_root_returns_ok() {
    let (state, _) = setup(&[]);

    let response = router(state).oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response.into_body()).await, "ok");
}

#[tokio::test]
async fn test_liveness_and_readiness() {
    let (state, _) = setup(&[]);
    let app = router(state);

    let live = app.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(live.status(), StatusCode::OK);

    let ready = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_bytes(ready.into_body()).await, "NOT READY");
}

#[tokio::test]
async fn test_health_reports_disconnected_upstream() {
    let (state, _) = setup(&[]);

    let response = router(state).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = serde_json::from_slice(&body_bytes(response.into_body()).await).unwrap();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["upstream"]["state"], "disconnected");
    assert_eq!(body["upstream"]["connected"], false);
    assert_eq!(body["upstream"]["last_reconnect_delay_ms"], Value::Null);
    assert_eq!(body["upstream"]["messages_received"], 0);
    assert_eq!(body["subscribers"], 0);
}

#[tokio::test]
async fn test_metrics_exposition() {
    init_metrics().unwrap();
    let (state, _) = setup(&[]);

    let response = router(state).oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_stream_rejects_wrong_token() {
    let (state, bridge) = setup(&[("PROXY_TOKEN", "s3cret")]);
    let app = router(state);

    for uri in ["/stream", "/stream?token=wrong", "/stream?token="] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        let body: Value =
            serde_json::from_slice(&body_bytes(response.into_body()).await).unwrap();
        assert_eq!(body, json!({"error": "unauthorized"}));
    }

    assert_eq!(bridge.subscriber_count(), 0);
}

#[tokio::test]
async fn test_stream_delivers_connected_then_frames() {
    let (state, bridge) = setup(&[("PROXY_TOKEN", "s3cret")]);

    let response = router(state)
        .oneshot(get("/stream?token=s3cret"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(bridge.subscriber_count(), 1);

    let mut events = response.into_body().into_data_stream();
    assert_eq!(next_chunk(&mut events).await, ": connected\n\n");

    bridge
        .broadcaster()
        .publish(&UpstreamMessage::Structured(json!([{"T": "t", "S": "SPY", "p": 123.45}])));
    bridge
        .broadcaster()
        .publish(&UpstreamMessage::Raw("heartbeat".to_string()));

    assert_eq!(
        next_chunk(&mut events).await,
        "data: [{\"T\":\"t\",\"S\":\"SPY\",\"p\":123.45}]\n\n"
    );
    assert_eq!(next_chunk(&mut events).await, "data: heartbeat\n\n");

    drop(events);
    assert_eq!(bridge.subscriber_count(), 0);
}

#[tokio::test]
async fn test_open_stream_sends_keepalive_pings() {
    let (state, bridge) = setup(&[("BRIDGE_KEEPALIVE_INTERVAL_MS", "50")]);

    let response = router(state).oneshot(get("/stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut events = response.into_body().into_data_stream();
    assert_eq!(next_chunk(&mut events).await, ": connected\n\n");

    let ping = next_chunk(&mut events).await;
    let millis = ping
        .strip_prefix(": ping ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .unwrap();
    assert!(millis.parse::<i64>().unwrap() > 0);

    drop(events);
    assert_eq!(bridge.subscriber_count(), 0);
}

#[tokio::test]
async fn test_stream_ends_when_bridge_shuts_down() {
    let (state, bridge) = setup(&[]);

    let response = router(state).oneshot(get("/stream")).await.unwrap();
    let mut events = response.into_body().into_data_stream();
    assert_eq!(next_chunk(&mut events).await, ": connected\n\n");

    timeout(WAIT, bridge.shutdown()).await.unwrap();

    assert!(timeout(WAIT, events.next()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cors_mirrors_request_origin() {
    let (state, _) = setup(&[]);
    let request = Request::builder()
        .uri("/")
        .header(header::ORIGIN, "https://dashboard.example")
        .body(Body::empty())
        .unwrap();

    let response = router(state).oneshot(request).await.unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://dashboard.example"
    );
}
