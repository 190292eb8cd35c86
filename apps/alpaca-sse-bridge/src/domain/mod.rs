//! Domain Layer - Core relay types and business logic.
//!
//! This layer contains the relay unit received from upstream, the upstream
//! session lifecycle states, and the registry of downstream subscribers.
//! Nothing here performs I/O.

/// Upstream message and session state types.
pub mod streaming;

/// Downstream subscriber tracking.
pub mod subscriber;
