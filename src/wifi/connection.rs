//! Station connection management.
//!
//! The manager owns the link state and the retry budget. It reacts to
//! station events and drives reconnects itself, up to the configured bound:
//!
//! ```text
//!  Idle --start--> Connecting --GotIp--> Connected
//!                   ^   |  ^                |
//!                   |   |  +--Disconnected--+  (budget left)
//!                   |   |
//!          (budget left) Disconnected, budget spent
//!                       v
//!                     Failed --reset--> Idle
//! ```

use crate::config::{RetryPolicy, WifiConfig};
use crate::radio::{RadioError, StationRadio};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Link state of the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    /// Retry budget exhausted. Stays here until [`ConnectionManager::reset`].
    Failed,
}

/// Station / IP stack event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationEvent {
    /// Driver is up and ready to associate.
    Started,
    /// Link lost or association failed.
    Disconnected { reason: u16 },
    /// DHCP lease obtained.
    GotIp { ip: Ipv4Addr },
}

/// What a handled event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationOutcome {
    /// Connect command issued.
    ConnectIssued,
    /// Entered Connected. `epoch` identifies this connected session.
    Ready { ip: Ipv4Addr, epoch: u64 },
    /// Lease renewed with a different address while connected.
    AddressChanged { ip: Ipv4Addr },
    /// Reconnect issued after a disconnect.
    Reconnecting { attempt: u32, max: u32 },
    /// Retry budget spent; now Failed.
    Exhausted { attempts: u32 },
}

/// Errors raised by the connection manager.
#[derive(Debug)]
pub enum ConnectionError {
    /// `start` called outside Idle.
    AlreadyStarted(ConnectionState),
    /// The driver could not be started.
    StartFailed(RadioError),
    /// The event is not valid in the current state.
    UnexpectedEvent {
        state: ConnectionState,
        event: StationEvent,
    },
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted(state) => {
                write!(f, "station already started (state {:?})", state)
            }
            Self::StartFailed(e) => write!(f, "failed to start station: {}", e),
            Self::UnexpectedEvent { state, event } => {
                write!(f, "unexpected station event {:?} in state {:?}", event, state)
            }
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::StartFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Owns [`ConnectionState`] and the retry counter.
pub struct ConnectionManager {
    state: ConnectionState,
    retry_count: u32,
    policy: RetryPolicy,
    ip: Option<Ipv4Addr>,
    /// Incremented on every transition into Connected.
    epoch: u64,
}

impl ConnectionManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            retry_count: 0,
            policy,
            ip: None,
            epoch: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    /// Address held while Connected.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.ip
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Configure credentials and start the driver.
    pub fn start<R>(&mut self, radio: &mut R, credentials: &WifiConfig) -> Result<(), ConnectionError>
    where
        R: StationRadio + ?Sized,
    {
        if self.state != ConnectionState::Idle {
            return Err(ConnectionError::AlreadyStarted(self.state));
        }
        info!("Connecting to WiFi: {}", credentials.ssid);
        radio
            .start(credentials)
            .map_err(ConnectionError::StartFailed)?;
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Return from Failed to Idle so `start` can be called again.
    pub fn reset(&mut self) {
        info!("Station reset (was {:?})", self.state);
        self.state = ConnectionState::Idle;
        self.retry_count = 0;
        self.ip = None;
    }

    /// Apply a station event.
    pub fn on_event<R>(
        &mut self,
        event: StationEvent,
        radio: &mut R,
    ) -> Result<StationOutcome, ConnectionError>
    where
        R: StationRadio + ?Sized,
    {
        match (self.state, event) {
            (ConnectionState::Connecting, StationEvent::Started) => {
                debug!("Station started, issuing connect");
                Ok(self.connect(radio))
            }
            (ConnectionState::Connecting, StationEvent::GotIp { ip }) => {
                self.state = ConnectionState::Connected;
                self.retry_count = 0;
                self.ip = Some(ip);
                self.epoch += 1;
                info!("Connected to WiFi, IP: {}", ip);
                Ok(StationOutcome::Ready {
                    ip,
                    epoch: self.epoch,
                })
            }
            (ConnectionState::Connected, StationEvent::GotIp { ip }) => {
                info!("Station address changed to {}", ip);
                self.ip = Some(ip);
                Ok(StationOutcome::AddressChanged { ip })
            }
            (
                ConnectionState::Connecting | ConnectionState::Connected,
                StationEvent::Disconnected { reason },
            ) => {
                warn!("WiFi disconnected (reason {})", reason);
                Ok(self.link_down(radio))
            }
            (state, event) => {
                warn!("Ignoring station event {:?} in state {:?}", event, state);
                Err(ConnectionError::UnexpectedEvent { state, event })
            }
        }
    }

    fn link_down<R>(&mut self, radio: &mut R) -> StationOutcome
    where
        R: StationRadio + ?Sized,
    {
        self.ip = None;
        let max = self.policy.max_attempts;
        self.retry_count = (self.retry_count + 1).min(max);

        if self.retry_count >= max {
            self.state = ConnectionState::Failed;
            error!("Failed to connect after {} attempts", self.retry_count);
            return StationOutcome::Exhausted {
                attempts: self.retry_count,
            };
        }

        self.state = ConnectionState::Connecting;
        info!("Retry WiFi connection {}/{}", self.retry_count, max);
        match self.connect(radio) {
            StationOutcome::ConnectIssued => StationOutcome::Reconnecting {
                attempt: self.retry_count,
                max,
            },
            other => other,
        }
    }

    fn connect<R>(&mut self, radio: &mut R) -> StationOutcome
    where
        R: StationRadio + ?Sized,
    {
        match radio.connect() {
            Ok(()) => StationOutcome::ConnectIssued,
            Err(e) => {
                // A refused connect counts as a failed attempt.
                warn!("Connect command failed: {}", e);
                self.link_down(radio)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeStation {
        started: usize,
        connects: usize,
        refuse_connects: usize,
    }

    impl StationRadio for FakeStation {
        fn start(&mut self, _credentials: &WifiConfig) -> Result<(), RadioError> {
            self.started += 1;
            Ok(())
        }

        fn connect(&mut self) -> Result<(), RadioError> {
            if self.refuse_connects > 0 {
                self.refuse_connects -= 1;
                return Err(RadioError::Rejected("not started".into()));
            }
            self.connects += 1;
            Ok(())
        }
    }

    const LOST: StationEvent = StationEvent::Disconnected { reason: 201 };

    fn ip() -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, 100)
    }

    fn started(max: u32) -> (ConnectionManager, FakeStation) {
        let mut radio = FakeStation::default();
        let mut manager = ConnectionManager::new(RetryPolicy { max_attempts: max });
        let creds = WifiConfig::new("lab-ap-wifi6", "SuperSecret123").unwrap();
        manager.start(&mut radio, &creds).unwrap();
        assert_eq!(
            manager.on_event(StationEvent::Started, &mut radio).unwrap(),
            StationOutcome::ConnectIssued
        );
        (manager, radio)
    }

    #[test]
    fn test_start_then_connect() {
        let (manager, radio) = started(5);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(radio.started, 1);
        assert_eq!(radio.connects, 1);
    }

    #[test]
    fn test_start_twice_rejected() {
        let (mut manager, mut radio) = started(5);
        let creds = WifiConfig::open("lab").unwrap();
        assert!(matches!(
            manager.start(&mut radio, &creds),
            Err(ConnectionError::AlreadyStarted(ConnectionState::Connecting))
        ));
        assert_eq!(radio.started, 1);
    }

    #[test]
    fn test_got_ip_connects_and_resets_retries() {
        let (mut manager, mut radio) = started(5);
        manager.on_event(LOST, &mut radio).unwrap();
        manager.on_event(LOST, &mut radio).unwrap();
        assert_eq!(manager.retry_count(), 2);

        let outcome = manager
            .on_event(StationEvent::GotIp { ip: ip() }, &mut radio)
            .unwrap();
        assert_eq!(outcome, StationOutcome::Ready { ip: ip(), epoch: 1 });
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.retry_count(), 0);
        assert_eq!(manager.ip(), Some(ip()));
    }

    #[test]
    fn test_fifth_disconnect_fails() {
        let (mut manager, mut radio) = started(5);
        for attempt in 1..5 {
            let outcome = manager.on_event(LOST, &mut radio).unwrap();
            assert_eq!(outcome, StationOutcome::Reconnecting { attempt, max: 5 });
            assert!(manager.retry_count() <= manager.max_attempts());
        }
        let outcome = manager.on_event(LOST, &mut radio).unwrap();
        assert_eq!(outcome, StationOutcome::Exhausted { attempts: 5 });
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert_eq!(manager.retry_count(), 5);
        // initial connect + four reconnects
        assert_eq!(radio.connects, 5);
    }

    #[test]
    fn test_zero_budget_fails_immediately() {
        let (mut manager, mut radio) = started(0);
        assert_eq!(
            manager.on_event(LOST, &mut radio).unwrap(),
            StationOutcome::Exhausted { attempts: 0 }
        );
        assert_eq!(manager.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_link_loss_from_connected_reconnects() {
        let (mut manager, mut radio) = started(3);
        manager.on_event(LOST, &mut radio).unwrap();
        manager
            .on_event(StationEvent::GotIp { ip: ip() }, &mut radio)
            .unwrap();

        // Link loss from Connected reconnects.
        assert_eq!(
            manager.on_event(LOST, &mut radio).unwrap(),
            StationOutcome::Reconnecting { attempt: 1, max: 3 }
        );
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.ip(), None);

        let outcome = manager
            .on_event(StationEvent::GotIp { ip: ip() }, &mut radio)
            .unwrap();
        assert_eq!(outcome, StationOutcome::Ready { ip: ip(), epoch: 2 });
    }

    #[test]
    fn test_failed_is_terminal_until_reset() {
        let (mut manager, mut radio) = started(1);
        manager.on_event(LOST, &mut radio).unwrap();
        assert_eq!(manager.state(), ConnectionState::Failed);

        for event in [StationEvent::Started, StationEvent::GotIp { ip: ip() }, LOST] {
            assert!(manager.on_event(event, &mut radio).is_err());
        }
        assert_eq!(manager.state(), ConnectionState::Failed);

        manager.reset();
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert_eq!(manager.retry_count(), 0);
        let creds = WifiConfig::open("lab").unwrap();
        manager.start(&mut radio, &creds).unwrap();
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_got_ip_while_idle_rejected() {
        let mut radio = FakeStation::default();
        let mut manager = ConnectionManager::new(RetryPolicy::default());
        let err = manager
            .on_event(StationEvent::GotIp { ip: ip() }, &mut radio)
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::UnexpectedEvent {
                state: ConnectionState::Idle,
                ..
            }
        ));
        assert_eq!(manager.epoch(), 0);
    }

    #[test]
    fn test_address_change_keeps_epoch() {
        let (mut manager, mut radio) = started(5);
        manager
            .on_event(StationEvent::GotIp { ip: ip() }, &mut radio)
            .unwrap();
        let other = Ipv4Addr::new(10, 0, 0, 7);
        assert_eq!(
            manager
                .on_event(StationEvent::GotIp { ip: other }, &mut radio)
                .unwrap(),
            StationOutcome::AddressChanged { ip: other }
        );
        assert_eq!(manager.epoch(), 1);
        assert_eq!(manager.ip(), Some(other));
    }

    #[test]
    fn test_refused_connect_counts_as_attempt() {
        let mut radio = FakeStation {
            refuse_connects: 1,
            ..Default::default()
        };
        let mut manager = ConnectionManager::new(RetryPolicy { max_attempts: 5 });
        let creds = WifiConfig::open("lab").unwrap();
        manager.start(&mut radio, &creds).unwrap();
        let outcome = manager.on_event(StationEvent::Started, &mut radio).unwrap();
        assert_eq!(outcome, StationOutcome::Reconnecting { attempt: 1, max: 5 });
        assert_eq!(radio.connects, 1);
    }
}
