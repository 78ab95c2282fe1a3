//! Radio capability surfaces.
//!
//! The state machines never talk to a driver directly. They issue commands
//! through the traits below, and every asynchronous outcome comes back as a
//! [`RadioEvent`] on a single ordered channel consumed by the dispatcher in
//! [`crate::node`].
//!
//! Back-ends:
//! - `esp32` - ESP-IDF WiFi, iTWT and Bluedroid extended advertising (ESP32 only)
//! - [`sim`] - In-process simulated radio for the host and for tests

#[cfg(feature = "esp32")]
pub mod esp32;
pub mod sim;

use crate::ble::{AdvCommand, AdvCompletion};
use crate::config::WifiConfig;
use crate::twt::{DutyCycleRequest, TwtEvent};
use crate::wifi::StationEvent;
use std::fmt;
use tokio::sync::mpsc;

/// Lifecycle event emitted by a radio back-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// WiFi station / IP stack.
    Station(StationEvent),
    /// Individual TWT agreement.
    DutyCycle(TwtEvent),
    /// Completion of an extended advertising setup command.
    Advertising(AdvCompletion),
}

/// Producer side of the dispatcher channel. Safe to use from driver
/// callbacks running on other threads.
pub type EventSender = mpsc::UnboundedSender<RadioEvent>;

/// Consumer side of the dispatcher channel.
pub type EventReceiver = mpsc::UnboundedReceiver<RadioEvent>;

/// Create the dispatcher channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// WiFi station capability.
pub trait StationRadio: Send {
    /// Configure credentials and start the driver. Emits
    /// [`StationEvent::Started`] once the driver is up.
    fn start(&mut self, credentials: &WifiConfig) -> Result<(), RadioError>;

    /// Begin association. Emits [`StationEvent::GotIp`] or
    /// [`StationEvent::Disconnected`].
    fn connect(&mut self) -> Result<(), RadioError>;
}

/// Individual TWT negotiation capability.
pub trait DutyCycleRadio: Send {
    /// Send a TWT setup request. An `Err` means the request never left the
    /// station; the AP's answer arrives later as a [`TwtEvent`].
    fn request(&mut self, request: &DutyCycleRequest) -> Result<(), RadioError>;
}

/// Extended advertising capability.
pub trait AdvertisingRadio: Send {
    /// Issue one setup command. Each accepted command produces exactly one
    /// [`AdvCompletion`].
    fn issue(&mut self, command: &AdvCommand) -> Result<(), RadioError>;
}

/// Errors returned synchronously by a capability.
#[derive(Debug)]
pub enum RadioError {
    /// The capability does not support the requested configuration.
    Unsupported(&'static str),
    /// The driver refused the command.
    Rejected(String),
    /// ESP-IDF error.
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(what) => write!(f, "unsupported: {}", what),
            Self::Rejected(reason) => write!(f, "rejected: {}", reason),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "ESP error: {}", e),
        }
    }
}

impl std::error::Error for RadioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            #[cfg(feature = "esp32")]
            Self::Esp(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for RadioError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}

/// The three capabilities driven by the dispatcher.
pub struct Radios {
    pub station: Box<dyn StationRadio>,
    pub duty_cycle: Box<dyn DutyCycleRadio>,
    pub advertising: Box<dyn AdvertisingRadio>,
}

impl Radios {
    pub fn new(
        station: impl StationRadio + 'static,
        duty_cycle: impl DutyCycleRadio + 'static,
        advertising: impl AdvertisingRadio + 'static,
    ) -> Self {
        Self {
            station: Box::new(station),
            duty_cycle: Box::new(duty_cycle),
            advertising: Box::new(advertising),
        }
    }
}
