//! WiFi station credentials.
//!
//! Platform-independent so the validation and NVS encoding rules can be
//! tested on the host machine.
//!
//! # Example
//!
//! ```
//! use twt_beacon_esp32::config::WifiConfig;
//!
//! let config = WifiConfig::new("lab-ap-wifi6", "SuperSecret123").unwrap();
//! assert!(!config.is_open());
//! assert!(config.validate().is_ok());
//! ```

use super::ConfigError;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum passphrase length for WPA2/WPA3-PSK.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Minimum passphrase length for WPA2/WPA3-PSK.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Credentials for joining the access point.
///
/// The password is wiped from memory when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct WifiConfig {
    /// Network SSID (1-32 bytes).
    pub ssid: String,
    /// Passphrase (8-64 bytes), empty for open networks.
    pub password: String,
}

impl WifiConfig {
    /// Create and validate credentials.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Credentials for an open network.
    pub fn open(ssid: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(ssid, String::new())
    }

    /// Check SSID and password lengths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }
        if !self.password.is_empty() && self.password.len() < MIN_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooShort {
                len: self.password.len(),
                min: MIN_PASSWORD_LEN,
            });
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooLong {
                len: self.password.len(),
                max: MAX_PASSWORD_LEN,
            });
        }
        Ok(())
    }

    /// `true` when no passphrase is set.
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }

    /// Encode for NVS storage.
    ///
    /// Format: `[ssid_len:1][ssid:N][password_len:1][password:M]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.ssid.len() + self.password.len());
        bytes.push(self.ssid.len() as u8);
        bytes.extend_from_slice(self.ssid.as_bytes());
        bytes.push(self.password.len() as u8);
        bytes.extend_from_slice(self.password.as_bytes());
        bytes
    }

    /// Decode an NVS blob written by [`WifiConfig::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let (&ssid_len, rest) = bytes
            .split_first()
            .ok_or_else(|| ConfigError::InvalidFormat("empty data".into()))?;
        let ssid_len = ssid_len as usize;
        if rest.len() < ssid_len + 1 {
            return Err(ConfigError::InvalidFormat("truncated SSID".into()));
        }
        let (ssid, rest) = rest.split_at(ssid_len);

        let password_len = rest[0] as usize;
        let password = rest[1..]
            .get(..password_len)
            .ok_or_else(|| ConfigError::InvalidFormat("truncated password".into()))?;

        let ssid = std::str::from_utf8(ssid)
            .map_err(|_| ConfigError::InvalidFormat("invalid SSID UTF-8".into()))?;
        let password = std::str::from_utf8(password)
            .map_err(|_| ConfigError::InvalidFormat("invalid password UTF-8".into()))?;

        Self::new(ssid, password)
    }
}

impl fmt::Debug for WifiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiConfig")
            .field("ssid", &self.ssid)
            .field("password", &if self.is_open() { "" } else { "***" })
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = WifiConfig::new("lab-ap-wifi6", "SuperSecret123").unwrap();
        assert_eq!(config.ssid, "lab-ap-wifi6");
        assert!(!config.is_open());
    }

    #[test]
    fn test_open_network() {
        let config = WifiConfig::open("OpenNetwork").unwrap();
        assert!(config.is_open());
    }

    #[test]
    fn test_empty_ssid() {
        assert_eq!(WifiConfig::new("", "password123"), Err(ConfigError::SsidEmpty));
    }

    #[test]
    fn test_ssid_length_bounds() {
        assert!(WifiConfig::new("a".repeat(32), "password123").is_ok());
        assert!(matches!(
            WifiConfig::new("a".repeat(33), "password123"),
            Err(ConfigError::SsidTooLong { len: 33, max: 32 })
        ));
    }

    #[test]
    fn test_password_length_bounds() {
        assert!(matches!(
            WifiConfig::new("Net", "short"),
            Err(ConfigError::PasswordTooShort { .. })
        ));
        assert!(WifiConfig::new("Net", "12345678").is_ok());
        assert!(WifiConfig::new("Net", "a".repeat(64)).is_ok());
        assert!(matches!(
            WifiConfig::new("Net", "a".repeat(65)),
            Err(ConfigError::PasswordTooLong { .. })
        ));
    }

    #[test]
    fn test_nvs_encoding_restores_credentials() {
        let config = WifiConfig::new("lab-ap-wifi6", "SuperSecret123").unwrap();
        let bytes = config.to_bytes();
        assert_eq!(bytes[0], 12);
        assert_eq!(WifiConfig::from_bytes(&bytes).unwrap(), config);

        let open = WifiConfig::open("OpenNet").unwrap();
        assert!(WifiConfig::from_bytes(&open.to_bytes()).unwrap().is_open());
    }

    #[test]
    fn test_decode_rejects_truncated_data() {
        assert!(matches!(
            WifiConfig::from_bytes(&[]),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!(matches!(
            WifiConfig::from_bytes(&[5, b'h', b'e', b'l', b'l']),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!(matches!(
            WifiConfig::from_bytes(&[1, b'x', 8, b'p']),
            Err(ConfigError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = WifiConfig::new("Net", "SuperSecret123").unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("SuperSecret123"));
        assert!(debug.contains("***"));
    }
}
