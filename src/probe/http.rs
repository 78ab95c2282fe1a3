//! HTTP `HEAD` prober.
//!
//! ESP-IDF's HTTP client on the device, `reqwest` on the host. Both accept
//! `https://` URLs: the device verifies against the ESP-IDF certificate bundle,
//! the host uses rustls.

use super::{ProbeError, Prober};
use std::time::Duration;

/// Real network prober.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpProber;

impl HttpProber {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(feature = "esp32"))]
impl Prober for HttpProber {
    fn head(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))?;
        let response = client.head(url).send().map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout
            } else {
                ProbeError::Transport(e.to_string())
            }
        })?;
        Ok(response.status().as_u16())
    }
}

#[cfg(feature = "esp32")]
impl Prober for HttpProber {
    fn head(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError> {
        use embedded_svc::http::client::Client;
        use embedded_svc::http::Method;
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

        let connection = EspHttpConnection::new(&Configuration {
            timeout: Some(timeout),
            crt_bundle_attach: Some(esp_idf_sys::esp_crt_bundle_attach),
            ..Default::default()
        })
        .map_err(|e| ProbeError::Transport(format!("{:?}", e)))?;
        let mut client = Client::wrap(connection);

        let request = client
            .request(Method::Head, url, &[])
            .map_err(|e| ProbeError::Transport(format!("{:?}", e)))?;
        let response = request
            .submit()
            .map_err(|e| ProbeError::Transport(format!("{:?}", e)))?;
        Ok(response.status())
    }
}
