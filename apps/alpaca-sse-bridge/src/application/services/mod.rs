//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `Broadcaster`: Fans each upstream message out to every registered sink

mod broadcaster;

pub use broadcaster::{Broadcaster, SinkRegistry};
