//! Individual TWT setup request.
//!
//! Times are counted in 802.11 time units (1 TU = 1024 µs). The service
//! period is carried as `mantissa * 2^exponent` TU.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use twt_beacon_esp32::twt::DutyCycleRequest;
//!
//! let request = DutyCycleRequest::default();
//! // 10240 TU ≈ 10.49 s service period, 195 TU ≈ 200 ms awake
//! assert_eq!(request.period(), Duration::from_micros(10_485_760));
//! assert_eq!(request.wake_duration(), Duration::from_micros(199_680));
//! ```

use crate::config::ConfigError;
use serde::Serialize;
use std::time::Duration;

/// Length of one time unit in microseconds.
pub const TU_MICROS: u64 = 1024;

/// Largest exponent accepted in the period encoding.
pub const MAX_EXPONENT: u8 = 31;

/// Largest TWT flow identifier.
pub const MAX_FLOW_ID: u8 = 7;

/// Who may propose schedule parameters during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationMode {
    /// Station requests, AP must accept the parameters as sent.
    RequestOnly,
    /// Station only responds to AP-initiated setup.
    RespondOnly,
    /// Station suggests, AP may answer with alternative parameters.
    Both,
}

/// TWT agreement requested from the AP once per connection epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycleRequest {
    /// Service period mantissa, in TU.
    pub mantissa: u16,
    /// Service period exponent.
    pub exponent: u8,
    /// Minimum wake duration, in TU.
    pub wake_duration: u8,
    pub negotiation_mode: NegotiationMode,
    /// AP sends a trigger frame at the start of each service period.
    pub triggered: bool,
    /// Station announces wakeup with a PS-Poll / QoS-null.
    pub announced: bool,
    /// Service periods recur without renegotiation.
    pub implicit_schedule: bool,
    /// Flow identifier (0-7).
    pub flow_id: u8,
}

impl Default for DutyCycleRequest {
    fn default() -> Self {
        Self {
            mantissa: 10240,
            exponent: 0,
            wake_duration: 195,
            negotiation_mode: NegotiationMode::Both,
            triggered: false,
            announced: false,
            implicit_schedule: true,
            flow_id: 0,
        }
    }
}

impl DutyCycleRequest {
    /// Service period in TU.
    pub fn period_tu(&self) -> u64 {
        (self.mantissa as u64) << self.exponent.min(MAX_EXPONENT)
    }

    /// Service period as wall-clock time.
    pub fn period(&self) -> Duration {
        tu_to_duration(self.period_tu())
    }

    /// Minimum wake duration as wall-clock time.
    pub fn wake_duration(&self) -> Duration {
        tu_to_duration(self.wake_duration as u64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mantissa == 0 {
            return Err(ConfigError::Invalid("TWT mantissa must be > 0"));
        }
        if self.exponent > MAX_EXPONENT {
            return Err(ConfigError::Invalid("TWT exponent must be <= 31"));
        }
        if self.wake_duration == 0 {
            return Err(ConfigError::Invalid("TWT wake duration must be > 0"));
        }
        if self.wake_duration as u64 >= self.period_tu() {
            return Err(ConfigError::Invalid(
                "TWT wake duration must be shorter than the period",
            ));
        }
        if self.flow_id > MAX_FLOW_ID {
            return Err(ConfigError::Invalid("TWT flow id must be <= 7"));
        }
        Ok(())
    }
}

/// Schedule the AP accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgreedSchedule {
    pub mantissa: u16,
    pub exponent: u8,
    /// Wake duration in TU.
    pub wake_duration: u8,
    pub flow_id: u8,
}

impl AgreedSchedule {
    /// Schedule identical to what was requested.
    pub fn from_request(request: &DutyCycleRequest) -> Self {
        Self {
            mantissa: request.mantissa,
            exponent: request.exponent,
            wake_duration: request.wake_duration,
            flow_id: request.flow_id,
        }
    }

    /// Schedule reported by a driver that counts the period in µs.
    pub fn from_micros(period_us: u64, wake_duration: u8, flow_id: u8) -> Self {
        let (mantissa, exponent) = encode(period_us / TU_MICROS);
        Self {
            mantissa,
            exponent,
            wake_duration,
            flow_id,
        }
    }

    pub fn period(&self) -> Duration {
        tu_to_duration((self.mantissa as u64) << self.exponent.min(MAX_EXPONENT))
    }

    pub fn wake_duration(&self) -> Duration {
        tu_to_duration(self.wake_duration as u64)
    }
}

fn tu_to_duration(tu: u64) -> Duration {
    Duration::from_micros(tu.saturating_mul(TU_MICROS))
}

/// Re-encode a period in microseconds as `mantissa * 2^exponent` with the
/// smallest exponent whose mantissa fits in 16 bits. Low bits are truncated.
pub fn encode_micros(period_us: u64) -> (u16, u8) {
    encode(period_us)
}

fn encode(value: u64) -> (u16, u8) {
    let mut exponent = 0u8;
    let mut mantissa = value;
    while mantissa > u16::MAX as u64 && exponent < MAX_EXPONENT {
        mantissa >>= 1;
        exponent += 1;
    }
    (mantissa.min(u16::MAX as u64) as u16, exponent)
}
