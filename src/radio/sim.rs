//! Simulated radio.
//!
//! Answers every command with the event(s) a real driver would produce, on
//! the same dispatcher channel. A [`SimScript`] injects failures: dropped
//! associations, refused or declined TWT requests, failed advertising steps.

use super::{
    AdvertisingRadio, DutyCycleRadio, EventSender, RadioError, RadioEvent, StationRadio,
};
use crate::ble::{AdvCommand, AdvCompletion, AdvStep};
use crate::config::WifiConfig;
use crate::twt::{AgreedSchedule, DutyCycleRequest, NegotiationMode, SetupStatus, TwtEvent};
use crate::wifi::StationEvent;
use log::debug;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 802.11 reason code reported for a failed association (no AP found).
pub const REASON_NO_AP_FOUND: u16 = 201;

/// Status reported for a declined TWT setup.
pub const STATUS_DECLINED: i32 = -1;

/// Status reported for a failed advertising step.
pub const STATUS_ADV_FAILED: u32 = 0x0C;

/// Scripted behaviour of the simulated radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimScript {
    /// Number of connect commands answered with a disconnect before one
    /// succeeds.
    pub failed_connects: u32,
    /// Refuse TWT requests synchronously.
    pub reject_request: bool,
    /// Answer TWT requests with a declined setup.
    pub decline_agreement: bool,
    /// Advertising step whose completion reports failure.
    pub fail_step: Option<AdvStep>,
    /// Address handed out on association.
    pub ip: Ipv4Addr,
}

impl Default for SimScript {
    fn default() -> Self {
        Self {
            failed_connects: 0,
            reject_request: false,
            decline_agreement: false,
            fail_step: None,
            ip: Ipv4Addr::new(192, 168, 1, 100),
        }
    }
}

/// Command received by the simulated radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCommand {
    Start { ssid: String },
    Connect,
    Request(DutyCycleRequest),
    Advertising(AdvCommand),
}

struct SimInner {
    events: EventSender,
    script: SimScript,
    commands: Vec<SimCommand>,
}

/// In-process radio implementing all three capabilities. Clones share state.
#[derive(Clone)]
pub struct SimRadio {
    inner: Arc<Mutex<SimInner>>,
}

impl SimRadio {
    pub fn new(events: EventSender, script: SimScript) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                events,
                script,
                commands: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commands received so far, in order.
    pub fn commands(&self) -> Vec<SimCommand> {
        self.lock().commands.clone()
    }

    /// Replace the script for subsequent commands.
    pub fn set_script(&self, script: SimScript) {
        self.lock().script = script;
    }

    /// Emit an unsolicited event, e.g. a link drop or a TWT teardown.
    pub fn inject(&self, event: RadioEvent) {
        self.lock().emit(event);
    }
}

impl SimInner {
    fn emit(&self, event: RadioEvent) {
        debug!("sim: emitting {:?}", event);
        if self.events.send(event).is_err() {
            debug!("sim: dispatcher gone, event dropped");
        }
    }
}

impl StationRadio for SimRadio {
    fn start(&mut self, credentials: &WifiConfig) -> Result<(), RadioError> {
        let mut inner = self.lock();
        inner.commands.push(SimCommand::Start {
            ssid: credentials.ssid.clone(),
        });
        inner.emit(RadioEvent::Station(StationEvent::Started));
        Ok(())
    }

    fn connect(&mut self) -> Result<(), RadioError> {
        let mut inner = self.lock();
        inner.commands.push(SimCommand::Connect);
        let event = if inner.script.failed_connects > 0 {
            inner.script.failed_connects -= 1;
            StationEvent::Disconnected {
                reason: REASON_NO_AP_FOUND,
            }
        } else {
            StationEvent::GotIp {
                ip: inner.script.ip,
            }
        };
        inner.emit(RadioEvent::Station(event));
        Ok(())
    }
}

impl DutyCycleRadio for SimRadio {
    fn request(&mut self, request: &DutyCycleRequest) -> Result<(), RadioError> {
        let mut inner = self.lock();
        inner.commands.push(SimCommand::Request(*request));
        if request.negotiation_mode == NegotiationMode::RespondOnly {
            return Err(RadioError::Unsupported("TWT responder mode"));
        }
        if inner.script.reject_request {
            return Err(RadioError::Rejected("TWT setup refused by driver".into()));
        }
        let status = if inner.script.decline_agreement {
            SetupStatus::Declined(STATUS_DECLINED)
        } else {
            SetupStatus::Accepted(AgreedSchedule::from_request(request))
        };
        inner.emit(RadioEvent::DutyCycle(TwtEvent::SetupConfirmed(status)));
        Ok(())
    }
}

impl AdvertisingRadio for SimRadio {
    fn issue(&mut self, command: &AdvCommand) -> Result<(), RadioError> {
        let mut inner = self.lock();
        inner.commands.push(SimCommand::Advertising(command.clone()));
        let step = command.step();
        let completion = if inner.script.fail_step == Some(step) {
            AdvCompletion::failed(step, STATUS_ADV_FAILED)
        } else {
            AdvCompletion::success(step)
        };
        inner.emit(RadioEvent::Advertising(completion));
        Ok(())
    }
}
