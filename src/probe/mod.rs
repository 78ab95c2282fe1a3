//! Periodic HTTP reachability probe.
//!
//! - `http` - blocking `HEAD` request with a fixed timeout
//! - `scheduler` - fixed-interval loop, optionally following the TWT period

mod http;
mod scheduler;

pub use http::HttpProber;
pub use scheduler::{ProbeScheduler, PROBE_GRACE};

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Outcome of one probe. Any HTTP status counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub success: bool,
    pub status_code: Option<u16>,
}

impl ProbeResult {
    pub fn ok(status_code: u16) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            status_code: None,
        }
    }
}

impl From<&Result<u16, ProbeError>> for ProbeResult {
    fn from(outcome: &Result<u16, ProbeError>) -> Self {
        match outcome {
            Ok(status) => Self::ok(*status),
            Err(_) => Self::failed(),
        }
    }
}

/// Probe failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// No response within the timeout.
    Timeout,
    /// Connection, DNS or protocol failure.
    Transport(String),
    /// The blocking probe task panicked or was cancelled.
    Task(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Task(e) => write!(f, "probe task failed: {}", e),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Executes one blocking `HEAD` request.
pub trait Prober: Send + Sync + 'static {
    /// Return the response status, or an error if none arrived within
    /// `timeout`.
    fn head(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError>;
}
