//! WiFi station link.
//!
//! - `connection` - connection state machine with bounded reconnects
//!
//! Credential types and NVS persistence live in [`crate::config`].

mod connection;

pub use connection::{
    ConnectionError, ConnectionManager, ConnectionState, StationEvent, StationOutcome,
};
