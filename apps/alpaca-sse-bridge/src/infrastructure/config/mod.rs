//! Configuration Module
//!
//! Configuration loading for the bridge service.

mod settings;

pub use settings::{
    BridgeConfig, ConfigError, Credentials, DEFAULT_STREAM_URL, DEFAULT_SYMBOLS,
    ReconnectSettings, ServerSettings, StreamSettings, UpstreamSettings, parse_symbols,
};
