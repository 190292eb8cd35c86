//! Alpaca Stream Request Messages
//!
//! Outbound control messages for Alpaca's market data WebSocket.
//!
//! # Handshake
//!
//! 1. `{"action":"auth","key":"...","secret":"..."}`
//! 2. `{"action":"subscribe","trades":["SPY",...]}`
//!
//! Field order is part of the wire contract and follows struct order.
//!
//! # References
//!
//! - [Stock Streaming](https://docs.alpaca.markets/docs/streaming-market-data)

use serde::Serialize;

use crate::infrastructure::config::Credentials;

/// Authentication request for market data streams.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    /// Action: "auth"
    pub action: &'static str,

    /// API key
    pub key: String,

    /// API secret
    pub secret: String,
}

impl AuthRequest {
    /// Create a new authentication request.
    #[must_use]
    pub const fn new(key: String, secret: String) -> Self {
        Self {
            action: "auth",
            key,
            secret,
        }
    }

    /// Create an authentication request from configured credentials.
    #[must_use]
    pub fn from_credentials(credentials: &Credentials) -> Self {
        Self::new(
            credentials.api_key().to_string(),
            credentials.api_secret().to_string(),
        )
    }
}

/// Trade subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
    /// Action: "subscribe"
    pub action: &'static str,

    /// Trade symbols
    pub trades: Vec<String>,
}

impl SubscribeRequest {
    /// Create a subscribe request for trades on the given symbols.
    #[must_use]
    pub const fn trades(symbols: Vec<String>) -> Self {
        Self {
            action: "subscribe",
            trades: symbols,
        }
    }
}
