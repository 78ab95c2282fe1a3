//! Local network services.
//!
//! - `status_server` - `GET /status` JSON endpoint over the shared node state

mod status_server;

pub use status_server::{StatusServer, DEFAULT_STATUS_PORT};
