//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `routing_api` - HTTP client for the pedestrian routing service
//! - `kv` - persistent key-value backend (file-based, memory for tests)
//! - `events` - typed channel carrying guidance events to the UI layer
//! - `position` - position feed and simulated walker

pub mod events;
pub mod kv;
pub mod position;
pub mod routing_api;

// Re-export commonly used types
pub use events::{create_guidance_channel, GuidanceEvent, GuidanceSender};
pub use kv::{FileBackend, KeyValueBackend, MemoryBackend};
pub use position::{PositionUpdate, SimulatedWalker};
pub use routing_api::{ApiRoute, HttpRoutingApi, RoutingApi, RoutingError};
