//! Alpaca SSE Bridge Binary
//!
//! Starts the market data relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin alpaca-sse-bridge
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `ALPACA_KEY`: Alpaca API key
//! - `ALPACA_SECRET`: Alpaca API secret
//!
//! ## Optional
//! - `PORT`: HTTP port (default: 8787)
//! - `ALPACA_STREAM_URL`: Upstream stream (default: `wss://stream.data.alpaca.markets/v2/iex`)
//! - `SYMBOLS`: Comma-separated trade symbols (default: SPY)
//! - `PROXY_TOKEN`: Token required as `?token=` on `/stream`
//! - `BRIDGE_RECONNECT_DELAY_INITIAL_MS`, `BRIDGE_RECONNECT_DELAY_MAX_MS`, `BRIDGE_RECONNECT_JITTER`
//! - `BRIDGE_KEEPALIVE_INTERVAL_MS`, `BRIDGE_SUBSCRIBER_BUFFER`
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: cream-alpaca-sse-bridge)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use alpaca_sse_bridge::infrastructure::telemetry;
use alpaca_sse_bridge::{
    AppState, Bridge, BridgeConfig, BridgeServer, UpstreamSessionConfig, init_metrics,
};
use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Upper bound on waiting for the upstream session to close.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let telemetry_guard = telemetry::init();

    tracing::info!(
        otel_export = telemetry_guard.is_exporting(),
        "Starting Alpaca SSE bridge"
    );

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
    }

    let config = BridgeConfig::from_env()
        .inspect_err(|e| tracing::error!(error = %e, "Invalid configuration"))
        .context("loading configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let bridge = Bridge::spawn(UpstreamSessionConfig::from(&config));

    let state = Arc::new(AppState::new(Arc::clone(&bridge), &config));
    let server = BridgeServer::new(config.server.port, state, shutdown_token.clone());
    let listener = server.bind().await.context("binding HTTP listener")?;

    let server_task = tokio::spawn(server.serve(listener));

    tracing::info!("Bridge ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, bridge.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Upstream session did not stop in time"
        );
    }

    match server_task.await {
        Ok(result) => result.context("HTTP server")?,
        Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
    }

    tracing::info!("Bridge stopped");
    drop(telemetry_guard);
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &BridgeConfig) {
    tracing::info!(
        port = config.server.port,
        symbols = ?config.upstream.symbols,
        token_required = config.server.access_token.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        stream_url = %config.upstream.url,
        keepalive_ms = config.stream.keepalive_interval.as_millis(),
        subscriber_buffer = config.stream.subscriber_buffer,
        "Bridge settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
