//! Event dispatcher and shared node state.
//!
//! A [`Node`] owns the three radio capabilities and a single ordered event
//! channel. Its dispatcher routes every [`RadioEvent`] to the component that
//! owns the matching state machine, in delivery order, and never blocks:
//!
//! - station events go to the [`ConnectionManager`]; entering Connected
//!   starts a new TWT epoch and arms the settle timer, losing the link
//!   ends it
//! - TWT events go to the [`Negotiator`]; the resulting agreed schedule is
//!   published on a `watch` channel for the probe scheduler
//! - advertising completions go to the [`AdvertisingSequencer`]
//!
//! Other tasks see the state only through [`SharedState::snapshot`].

use crate::ble::{AdvStep, AdvertisingSequencer, AdvertisingState};
use crate::config::{ConfigError, NodeConfig};
use crate::probe::ProbeResult;
use crate::radio::{EventReceiver, RadioError, RadioEvent, Radios};
use crate::twt::{AgreedSchedule, DutyCycleState, NegotiationError, Negotiator, TwtEvent};
use crate::wifi::{
    ConnectionError, ConnectionManager, ConnectionState, StationEvent, StationOutcome,
};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Error type for node startup.
#[derive(Debug)]
pub enum NodeError {
    /// Invalid configuration.
    Config(ConfigError),
    /// Station could not be started.
    Connection(ConnectionError),
    /// Radio initialization failed.
    Radio(RadioError),
    /// Status endpoint or other I/O failure.
    Io(std::io::Error),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {}", e),
            Self::Connection(e) => write!(f, "connection error: {}", e),
            Self::Radio(e) => write!(f, "radio error: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Connection(e) => Some(e),
            Self::Radio(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<ConfigError> for NodeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ConnectionError> for NodeError {
    fn from(e: ConnectionError) -> Self {
        Self::Connection(e)
    }
}

impl From<RadioError> for NodeError {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

impl From<std::io::Error> for NodeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for NodeError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Radio(RadioError::Esp(e))
    }
}

/// Probe outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProbeStats {
    pub ok: u64,
    pub failed: u64,
    pub last_status: Option<u16>,
}

/// All mutable node state. Each state machine is only driven by the
/// dispatcher.
pub struct NodeState {
    pub connection: ConnectionManager,
    pub duty_cycle: Negotiator,
    pub advertising: AdvertisingSequencer,
    pub probes: ProbeStats,
    start_time: Instant,
}

impl NodeState {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            connection: ConnectionManager::new(config.retry),
            duty_cycle: Negotiator::new(),
            advertising: AdvertisingSequencer::new(config.advertising, config.service),
            probes: ProbeStats::default(),
            start_time: Instant::now(),
        }
    }
}

/// Point-in-time copy of the node state, served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub uptime_secs: u64,
    pub connection: ConnectionState,
    pub retry_count: u32,
    pub max_retry: u32,
    pub ip: Option<Ipv4Addr>,
    pub epoch: u64,
    pub duty_cycle: DutyCycleState,
    pub agreed_schedule: Option<AgreedSchedule>,
    pub advertising: AdvertisingState,
    pub advertising_stalled: Option<AdvStep>,
    pub probes: ProbeStats,
}

/// [`NodeState`] behind a mutex, shared between the dispatcher and readers.
#[derive(Clone)]
pub struct SharedState(Arc<Mutex<NodeState>>);

impl SharedState {
    pub fn new(state: NodeState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    /// Lock the state. A poisoned lock is recovered; every transition
    /// leaves the state consistent.
    pub fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let state = self.lock();
        NodeSnapshot {
            uptime_secs: state.start_time.elapsed().as_secs(),
            connection: state.connection.state(),
            retry_count: state.connection.retry_count(),
            max_retry: state.connection.max_attempts(),
            ip: state.connection.ip(),
            epoch: state.connection.epoch(),
            duty_cycle: state.duty_cycle.state(),
            agreed_schedule: state.duty_cycle.agreed_schedule(),
            advertising: state.advertising.state(),
            advertising_stalled: state.advertising.stalled(),
            probes: state.probes,
        }
    }

    pub fn record_probe(&self, result: ProbeResult) {
        let mut state = self.lock();
        if result.success {
            state.probes.ok += 1;
        } else {
            state.probes.failed += 1;
        }
        state.probes.last_status = result.status_code;
    }
}

/// Connectivity node: dispatcher plus the state it drives.
pub struct Node {
    config: NodeConfig,
    state: SharedState,
    radios: Radios,
    events: EventReceiver,
    schedule: watch::Sender<Option<AgreedSchedule>>,
    /// Settle timers report the epoch they were armed for.
    settled_tx: mpsc::UnboundedSender<u64>,
    settled_rx: mpsc::UnboundedReceiver<u64>,
}

impl Node {
    /// Create a node. `events` must be the receiver paired with the sender
    /// the radios emit on.
    pub fn new(config: NodeConfig, radios: Radios, events: EventReceiver) -> Self {
        let state = SharedState::new(NodeState::new(&config));
        let (schedule, _) = watch::channel(None);
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        Self {
            config,
            state,
            radios,
            events,
            schedule,
            settled_tx,
            settled_rx,
        }
    }

    /// Handle to the shared state.
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Receiver for the TWT schedule in force (`None` unless Active).
    pub fn schedule(&self) -> watch::Receiver<Option<AgreedSchedule>> {
        self.schedule.subscribe()
    }

    /// Start the station and the beacon, then dispatch events until
    /// cancelled. Only a station start failure is returned as an error.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), NodeError> {
        self.start()?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Dispatcher shutting down");
                    break;
                }
                Some(event) = self.events.recv() => {
                    self.dispatch(event, &cancel);
                }
                Some(epoch) = self.settled_rx.recv() => {
                    self.on_settled(epoch);
                }
            }
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), NodeError> {
        let mut state = self.state.lock();
        state
            .connection
            .start(self.radios.station.as_mut(), &self.config.wifi)?;

        // A stalled beacon does not stop the station.
        if let Err(e) = state.advertising.start(self.radios.advertising.as_mut()) {
            error!("Advertising setup failed: {}", e);
        }
        Ok(())
    }

    fn dispatch(&mut self, event: RadioEvent, cancel: &CancellationToken) {
        debug!("Dispatching {:?}", event);
        match event {
            RadioEvent::Station(event) => self.on_station(event, cancel),
            RadioEvent::DutyCycle(event) => self.on_duty_cycle(event),
            RadioEvent::Advertising(completion) => {
                let mut state = self.state.lock();
                if let Err(e) = state
                    .advertising
                    .on_completion(completion, self.radios.advertising.as_mut())
                {
                    debug!("Advertising completion not applied: {}", e);
                }
            }
        }
    }

    fn on_station(&mut self, event: StationEvent, cancel: &CancellationToken) {
        let outcome = {
            let mut state = self.state.lock();
            let outcome = state
                .connection
                .on_event(event, self.radios.station.as_mut());
            match &outcome {
                Ok(StationOutcome::Ready { epoch, .. }) => state.duty_cycle.begin_epoch(*epoch),
                Ok(StationOutcome::Reconnecting { .. } | StationOutcome::Exhausted { .. }) => {
                    state.duty_cycle.link_lost()
                }
                _ => {}
            }
            outcome
        };

        match outcome {
            Ok(StationOutcome::Ready { epoch, .. }) => {
                self.publish_schedule(None);
                self.arm_settle_timer(epoch, cancel);
            }
            Ok(StationOutcome::Reconnecting { .. }) => self.publish_schedule(None),
            Ok(StationOutcome::Exhausted { attempts }) => {
                self.publish_schedule(None);
                error!(
                    "WiFi retries exhausted after {} attempts; station stays down until reset",
                    attempts
                );
            }
            Ok(StationOutcome::ConnectIssued | StationOutcome::AddressChanged { .. }) => {}
            Err(e) => debug!("Station event not applied: {}", e),
        }
    }

    fn on_duty_cycle(&mut self, event: TwtEvent) {
        let schedule = {
            let mut state = self.state.lock();
            if let Err(e) = state.duty_cycle.on_event(event) {
                debug!("TWT event not applied: {}", e);
                return;
            }
            state.duty_cycle.active_schedule()
        };
        self.publish_schedule(schedule);
    }

    fn arm_settle_timer(&self, epoch: u64, cancel: &CancellationToken) {
        let delay = self.config.settle_delay;
        let tx = self.settled_tx.clone();
        let cancel = cancel.clone();
        debug!("TWT request for epoch {} in {:?}", epoch, delay);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(epoch);
                }
            }
        });
    }

    fn on_settled(&mut self, epoch: u64) {
        let mut state = self.state.lock();
        let NodeState {
            connection,
            duty_cycle,
            ..
        } = &mut *state;

        if epoch != connection.epoch() || epoch != duty_cycle.epoch() {
            debug!(
                "Stale settle timer for epoch {} (current {})",
                epoch,
                connection.epoch()
            );
            return;
        }

        match duty_cycle.negotiate(
            connection.state(),
            &self.config.duty_cycle,
            self.radios.duty_cycle.as_mut(),
        ) {
            Ok(()) => {}
            Err(NegotiationError::NotConnected(link)) => {
                warn!("Skipping TWT request, station is {:?}", link);
            }
            Err(e) => debug!("TWT request not sent: {}", e),
        }
    }

    fn publish_schedule(&self, schedule: Option<AgreedSchedule>) {
        self.schedule.send_if_modified(|current| {
            if *current == schedule {
                return false;
            }
            match schedule {
                Some(agreed) => info!("Duty cycle active, period {:?}", agreed.period()),
                None if current.is_some() => info!("Duty cycle inactive"),
                None => {}
            }
            *current = schedule;
            true
        });
    }
}
