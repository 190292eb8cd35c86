//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for downstream sinks and message publishing.
pub mod ports;

/// Application services (fan-out broadcasting).
pub mod services;
