//! NVS persistence for WiFi credentials.
//!
//! Credentials written here take precedence over the build-time defaults so
//! a deployed node can be moved to another AP without reflashing.

use super::{WifiConfig, MAX_PASSWORD_LEN, MAX_SSID_LEN};
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::EspError;
use log::{debug, warn};

/// NVS namespace for WiFi configuration.
const NVS_NAMESPACE: &str = "wifi_config";

/// NVS key for stored credentials.
const NVS_KEY: &str = "credentials";

/// `[ssid_len:1][ssid:32][password_len:1][password:64]` plus slack.
const MAX_CONFIG_BUFFER_SIZE: usize = 1 + MAX_SSID_LEN + 1 + MAX_PASSWORD_LEN + 4;

/// Open the credentials namespace on the default partition.
pub fn init_nvs(partition: EspNvsPartition<NvsDefault>) -> Result<EspNvs<NvsDefault>, EspError> {
    EspNvs::new(partition, NVS_NAMESPACE, true)
}

/// Load stored credentials.
///
/// Returns `None` if nothing is stored or the blob does not decode.
pub fn load_wifi_config(nvs: &EspNvs<NvsDefault>) -> Option<WifiConfig> {
    let mut buf = [0u8; MAX_CONFIG_BUFFER_SIZE];
    let bytes = match nvs.get_raw(NVS_KEY, &mut buf) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!("No WiFi credentials in NVS");
            return None;
        }
        Err(e) => {
            warn!("Failed to read WiFi credentials from NVS: {:?}", e);
            return None;
        }
    };

    match WifiConfig::from_bytes(bytes) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Stored WiFi credentials are corrupt: {}", e);
            None
        }
    }
}

/// Persist credentials.
pub fn save_wifi_config(nvs: &mut EspNvs<NvsDefault>, config: &WifiConfig) -> Result<(), EspError> {
    nvs.set_raw(NVS_KEY, &config.to_bytes())?;
    Ok(())
}
