//! Aggregated node configuration.
//!
//! [`NodeConfig::default`] reproduces the lab deployment: a Wi-Fi 6 AP with
//! a ~10 s TWT service period, a 100 ms LE Coded beacon for the
//! Environmental Sensing service and a HEAD probe every 10 s.

use super::{ConfigError, WifiConfig};
use crate::ble::{AdvertisingParameters, ServiceIdentifier};
use crate::twt::DutyCycleRequest;
use std::time::Duration;

/// Reconnect attempts allowed per session.
pub const DEFAULT_MAX_RETRY: u32 = 5;

/// Grace period between IP acquisition and the TWT request.
///
/// The association is not ready for a TWT setup frame right after DHCP.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(3000);

/// URL probed once per cycle.
pub const DEFAULT_PROBE_URL: &str = "http://example.com/";

/// Probe cycle, roughly one TWT service period.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Timeout for a single probe request.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Development credentials, overridable at build time.
const DEFAULT_SSID: &str = match option_env!("WIFI_SSID") {
    Some(ssid) => ssid,
    None => "lab-ap-wifi6",
};
const DEFAULT_PASSWORD: &str = match option_env!("WIFI_PASS") {
    Some(pass) => pass,
    None => "SuperSecret123",
};

/// Bounded reconnect policy for the station link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Disconnects tolerated per session before giving up.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRY,
        }
    }
}

/// Periodic probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Target of the HEAD request.
    pub url: String,
    /// Time between probes.
    pub interval: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Follow the agreed TWT period instead of `interval` while the duty
    /// cycle is active.
    pub align_to_duty_cycle: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PROBE_URL.to_string(),
            interval: DEFAULT_PROBE_INTERVAL,
            timeout: DEFAULT_PROBE_TIMEOUT,
            align_to_duty_cycle: false,
        }
    }
}

impl ProbeConfig {
    /// Check interval, timeout and URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::Invalid("probe url must be http(s)"));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("probe interval must be > 0"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("probe timeout must be > 0"));
        }
        if self.timeout >= self.interval {
            return Err(ConfigError::Invalid(
                "probe timeout must be shorter than the interval",
            ));
        }
        Ok(())
    }
}

/// Everything the node needs at startup.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Station credentials.
    pub wifi: WifiConfig,
    /// Reconnect bound.
    pub retry: RetryPolicy,
    /// TWT agreement requested once per connection epoch.
    pub duty_cycle: DutyCycleRequest,
    /// Delay between IP acquisition and the TWT request.
    pub settle_delay: Duration,
    /// Extended advertising parameters.
    pub advertising: AdvertisingParameters,
    /// Service UUID carried in the beacon.
    pub service: ServiceIdentifier,
    /// Periodic probe.
    pub probe: ProbeConfig,
    /// Port for the status endpoint, `None` to disable it.
    pub status_port: Option<u16>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            wifi: WifiConfig {
                ssid: DEFAULT_SSID.to_string(),
                password: DEFAULT_PASSWORD.to_string(),
            },
            retry: RetryPolicy::default(),
            duty_cycle: DutyCycleRequest::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            advertising: AdvertisingParameters::default(),
            service: ServiceIdentifier::ENVIRONMENTAL_SENSING,
            probe: ProbeConfig::default(),
            status_port: None,
        }
    }
}

impl NodeConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.wifi.validate()?;
        self.duty_cycle.validate()?;
        self.advertising.validate()?;
        self.probe.validate()?;
        Ok(())
    }

    /// Defaults with overrides taken from the process environment.
    ///
    /// Recognized keys: `WIFI_SSID`, `WIFI_PASS`, `NODE_MAX_RETRY`,
    /// `NODE_SETTLE_DELAY_MS`, `NODE_PROBE_URL`, `NODE_PROBE_INTERVAL_SECS`,
    /// `NODE_PROBE_ALIGN`, `NODE_STATUS_PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ssid) = lookup("WIFI_SSID") {
            let password = lookup("WIFI_PASS").unwrap_or_default();
            config.wifi = WifiConfig::new(ssid, password)?;
        }
        if let Some(value) = lookup("NODE_MAX_RETRY") {
            config.retry.max_attempts = parse("NODE_MAX_RETRY", value)?;
        }
        if let Some(value) = lookup("NODE_SETTLE_DELAY_MS") {
            config.settle_delay = Duration::from_millis(parse("NODE_SETTLE_DELAY_MS", value)?);
        }
        if let Some(url) = lookup("NODE_PROBE_URL") {
            config.probe.url = url;
        }
        if let Some(value) = lookup("NODE_PROBE_INTERVAL_SECS") {
            config.probe.interval =
                Duration::from_secs(parse("NODE_PROBE_INTERVAL_SECS", value)?);
        }
        if let Some(value) = lookup("NODE_PROBE_ALIGN") {
            config.probe.align_to_duty_cycle = parse("NODE_PROBE_ALIGN", value)?;
        }
        if let Some(value) = lookup("NODE_STATUS_PORT") {
            config.status_port = Some(parse("NODE_STATUS_PORT", value)?);
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride { key, value })
}
