//! Alpaca WebSocket Adapter
//!
//! Implements the upstream side of the bridge against Alpaca's market data
//! stream:
//!
//! - **messages**: auth and subscribe request shapes
//! - **codec**: JSON decode of inbound frames with raw fallback
//! - **reconnect**: exponential backoff policy
//! - **session**: the connection lifecycle state machine

pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod session;

pub use codec::{CodecError, JsonCodec};
pub use messages::{AuthRequest, SubscribeRequest};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use session::{SessionError, SessionStats, UpstreamSession, UpstreamSessionConfig};
