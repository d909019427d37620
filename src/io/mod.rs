//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT client for receiving batched telemetry
//! - `confirm` - MQTT publisher for confirmations and driver rosters
//! - `overpass` - Nearest-road lookup against the Overpass API
//! - `store` - In-process telemetry store with JSONL append-through

pub mod confirm;
pub mod mqtt;
pub mod overpass;
pub mod store;

// Re-export commonly used types
pub use confirm::{Confirmation, MqttNotifier, Notifier};
pub use overpass::OverpassClient;
pub use store::MemoryStore;
