//! Extended advertising parameters.
//!
//! Intervals are in Bluetooth baseband units of 0.625 ms.

use crate::config::ConfigError;
use std::time::Duration;

/// Advertising set used for the beacon.
pub const DEFAULT_INSTANCE: u8 = 1;

/// 0x00A0 * 0.625 ms = 100 ms.
pub const DEFAULT_INTERVAL: u32 = 0x00A0;

/// All three primary advertising channels (37, 38, 39).
pub const ALL_CHANNELS: u8 = 0x07;

/// Smallest interval allowed for non-connectable extended advertising.
pub const MIN_INTERVAL: u32 = 0x0020;

/// Largest interval encodable in the 24-bit HCI field.
pub const MAX_INTERVAL: u32 = 0x00FF_FFFF;

/// Largest advertising SID.
pub const MAX_SID: u8 = 0x0F;

/// Primary advertising PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryPhy {
    Le1M,
    /// LE Coded (long range).
    LeCoded,
}

/// Secondary advertising PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryPhy {
    Le1M,
    Le2M,
    /// LE Coded (long range).
    LeCoded,
}

/// Advertising event properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingMode {
    /// Beacon: nobody can connect or scan.
    NonConnectableNonScannable,
    NonConnectableScannable,
    Connectable,
}

/// Own address type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
}

/// Scan/connect request filter policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPolicy {
    AllowAll,
    WhitelistScan,
    WhitelistConnect,
    WhitelistAll,
}

/// Requested TX power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPower {
    /// Let the controller choose.
    NoPreference,
    Dbm(i8),
}

/// Immutable parameters of the beacon advertising set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParameters {
    /// Advertising set handle.
    pub instance: u8,
    pub mode: AdvertisingMode,
    pub primary_phy: PrimaryPhy,
    pub secondary_phy: SecondaryPhy,
    /// Minimum interval, 0.625 ms units.
    pub interval_min: u32,
    /// Maximum interval, 0.625 ms units.
    pub interval_max: u32,
    /// Bitmask of primary channels 37/38/39.
    pub channel_map: u8,
    pub address_type: AddressType,
    pub filter_policy: FilterPolicy,
    pub tx_power: TxPower,
    /// Advertising SID (0-15).
    pub secondary_id: u8,
}

impl Default for AdvertisingParameters {
    fn default() -> Self {
        Self {
            instance: DEFAULT_INSTANCE,
            mode: AdvertisingMode::NonConnectableNonScannable,
            primary_phy: PrimaryPhy::LeCoded,
            secondary_phy: SecondaryPhy::LeCoded,
            interval_min: DEFAULT_INTERVAL,
            interval_max: DEFAULT_INTERVAL,
            channel_map: ALL_CHANNELS,
            address_type: AddressType::Public,
            filter_policy: FilterPolicy::AllowAll,
            tx_power: TxPower::NoPreference,
            secondary_id: 1,
        }
    }
}

impl AdvertisingParameters {
    /// `true` when both PHYs are LE Coded.
    pub fn is_long_range(&self) -> bool {
        self.primary_phy == PrimaryPhy::LeCoded && self.secondary_phy == SecondaryPhy::LeCoded
    }

    /// Minimum interval as wall-clock time.
    pub fn interval_min_duration(&self) -> Duration {
        interval_to_duration(self.interval_min)
    }

    /// Maximum interval as wall-clock time.
    pub fn interval_max_duration(&self) -> Duration {
        interval_to_duration(self.interval_max)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_min < MIN_INTERVAL || self.interval_max > MAX_INTERVAL {
            return Err(ConfigError::Invalid(
                "advertising interval out of range (0x20..=0xFFFFFF)",
            ));
        }
        if self.interval_min > self.interval_max {
            return Err(ConfigError::Invalid(
                "advertising interval_min must be <= interval_max",
            ));
        }
        if self.channel_map == 0 || self.channel_map & !ALL_CHANNELS != 0 {
            return Err(ConfigError::Invalid(
                "advertising channel map must be a non-empty subset of 0x07",
            ));
        }
        if self.secondary_id > MAX_SID {
            return Err(ConfigError::Invalid("advertising SID must be <= 15"));
        }
        Ok(())
    }
}

fn interval_to_duration(units: u32) -> Duration {
    Duration::from_micros(units as u64 * 625)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_long_range_beacon() {
        let params = AdvertisingParameters::default();
        assert!(params.is_long_range());
        assert_eq!(params.mode, AdvertisingMode::NonConnectableNonScannable);
        assert_eq!(params.instance, 1);
        assert_eq!(params.secondary_id, 1);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_default_interval_is_100ms() {
        let params = AdvertisingParameters::default();
        assert_eq!(params.interval_min_duration(), Duration::from_millis(100));
        assert_eq!(params.interval_max_duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_interval_validation() {
        let mut params = AdvertisingParameters::default();
        params.interval_min = 0x10;
        assert!(params.validate().is_err());

        let mut params = AdvertisingParameters::default();
        params.interval_min = 0x200;
        params.interval_max = 0x100;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_channel_map_validation() {
        let mut params = AdvertisingParameters::default();
        params.channel_map = 0;
        assert!(params.validate().is_err());
        params.channel_map = 0x08;
        assert!(params.validate().is_err());
        params.channel_map = 0x01;
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_sid_validation() {
        let mut params = AdvertisingParameters::default();
        params.secondary_id = 16;
        assert!(params.validate().is_err());
    }
}
