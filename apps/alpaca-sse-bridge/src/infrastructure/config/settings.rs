//! Bridge Configuration Settings
//!
//! Configuration types for the bridge, loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Default upstream market data stream (free IEX feed).
pub const DEFAULT_STREAM_URL: &str = "wss://stream.data.alpaca.markets/v2/iex";

/// Default symbol list.
pub const DEFAULT_SYMBOLS: &str = "SPY";

/// Alpaca API credentials.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the API secret.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// HTTP server settings.
#[derive(Clone)]
pub struct ServerSettings {
    /// Listening port for the SSE and health endpoints.
    pub port: u16,
    /// Token required as `?token=` on the stream endpoint (None = open).
    pub access_token: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8787,
            access_token: None,
        }
    }
}

impl std::fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSettings")
            .field("port", &self.port)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Upstream feed settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// WebSocket URL of the market data stream.
    pub url: String,
    /// Trade symbols to subscribe to.
    pub symbols: Vec<String>,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            symbols: parse_symbols(DEFAULT_SYMBOLS),
        }
    }
}

/// Upstream reconnection settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Initial reconnection delay.
    pub initial_delay: Duration,
    /// Maximum reconnection delay.
    pub max_delay: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub multiplier: f64,
    /// Jitter fraction applied to each delay (0 = none).
    pub jitter_factor: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

/// Downstream stream settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Interval between `: ping` keep-alive comments.
    pub keepalive_interval: Duration,
    /// Frames buffered per subscriber before new ones are dropped.
    pub subscriber_buffer: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_millis(15_000),
            subscriber_buffer: 1024,
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// API credentials.
    pub credentials: Credentials,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Upstream feed settings.
    pub upstream: UpstreamSettings,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Downstream stream settings.
    pub stream: StreamSettings,
}

impl BridgeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream credentials are missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream credentials are missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = required(&lookup, "ALPACA_KEY")?;
        let api_secret = required(&lookup, "ALPACA_SECRET")?;

        let server = ServerSettings {
            port: parse_or(&lookup, "PORT", ServerSettings::default().port),
            access_token: lookup("PROXY_TOKEN").filter(|t| !t.is_empty()),
        };

        let upstream = UpstreamSettings {
            url: lookup("ALPACA_STREAM_URL")
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
            symbols: parse_symbols(
                &lookup("SYMBOLS").unwrap_or_else(|| DEFAULT_SYMBOLS.to_string()),
            ),
        };

        let defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            initial_delay: parse_millis_or(
                &lookup,
                "BRIDGE_RECONNECT_DELAY_INITIAL_MS",
                defaults.initial_delay,
            ),
            max_delay: parse_millis_or(&lookup, "BRIDGE_RECONNECT_DELAY_MAX_MS", defaults.max_delay),
            multiplier: defaults.multiplier,
            jitter_factor: parse_or(&lookup, "BRIDGE_RECONNECT_JITTER", defaults.jitter_factor)
                .clamp(0.0, 1.0),
        };

        let defaults = StreamSettings::default();
        let stream = StreamSettings {
            keepalive_interval: parse_millis_or(
                &lookup,
                "BRIDGE_KEEPALIVE_INTERVAL_MS",
                defaults.keepalive_interval,
            ),
            subscriber_buffer: parse_or(
                &lookup,
                "BRIDGE_SUBSCRIBER_BUFFER",
                defaults.subscriber_buffer,
            )
            .max(1),
        };

        Ok(Self {
            credentials: Credentials::new(api_key, api_secret),
            server,
            upstream,
            reconnect,
            stream,
        })
    }
}

/// Split a comma-separated symbol list, trimming and dropping empty entries.
#[must_use]
pub fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_millis_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
