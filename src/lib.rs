//! Power-aware connectivity firmware for a Wi-Fi 6 + BLE node.
//!
//! The node keeps a station link up with bounded reconnects, negotiates an
//! individual TWT agreement once per connection, broadcasts a BLE Long Range
//! beacon and probes an HTTP endpoint on a fixed interval.
//!
//! Everything except `radio::esp32` and the NVS helpers is platform
//! independent and tested on the host against [`radio::sim`].

pub mod ble;
pub mod config;
pub mod network;
pub mod node;
pub mod policy;
pub mod probe;
pub mod radio;
pub mod twt;
pub mod wifi;

// Re-export commonly used items
pub use ble::{AdvertisingParameters, AdvertisingSequencer, BeaconPayload, ServiceIdentifier};
pub use config::{ConfigError, NodeConfig, WifiConfig};
pub use network::{StatusServer, DEFAULT_STATUS_PORT};
pub use node::{Node, NodeError, NodeSnapshot, SharedState};
pub use probe::{HttpProber, ProbeScheduler};
pub use radio::{event_channel, RadioEvent, Radios};
pub use twt::{DutyCycleRequest, Negotiator};
pub use wifi::{ConnectionManager, ConnectionState};
