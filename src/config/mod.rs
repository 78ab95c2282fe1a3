//! Node configuration.
//!
//! All values are static for the lifetime of the process and are fixed at
//! startup, before any radio is touched.
//!
//! # Components
//!
//! - `wifi` - WiFi station credentials (host-testable)
//! - `node` - Aggregated node configuration, retry bound, probe settings
//! - `storage` - NVS persistence for credentials (ESP32 only)

mod node;
mod wifi;

#[cfg(feature = "esp32")]
mod storage;

pub use node::{
    NodeConfig, ProbeConfig, RetryPolicy, DEFAULT_MAX_RETRY, DEFAULT_PROBE_INTERVAL,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_PROBE_URL, DEFAULT_SETTLE_DELAY,
};
pub use wifi::{WifiConfig, MAX_PASSWORD_LEN, MAX_SSID_LEN, MIN_PASSWORD_LEN};

#[cfg(feature = "esp32")]
pub use storage::{init_nvs, load_wifi_config, save_wifi_config};

use std::fmt;

/// Errors raised while building or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2/WPA3.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// Invalid data format during deserialization.
    InvalidFormat(String),
    /// No credentials could be found in any source.
    MissingCredentials,
    /// An environment override could not be parsed.
    InvalidOverride { key: &'static str, value: String },
    /// A configuration value is out of range.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
            Self::MissingCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidOverride { key, value } => {
                write!(f, "invalid value for {}: {:?}", key, value)
            }
            Self::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
