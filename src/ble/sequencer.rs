//! Extended advertising setup sequencer.
//!
//! Starting a long-range beacon takes three commands, each completed
//! asynchronously by the BLE stack:
//!
//! ```text
//! Uninitialized --SetParams done--> ParamsSet --SetData done--> DataSet --Start done--> Advertising
//!      |                               |                           |
//!   issue SetParams               issue SetData               issue Start
//! ```
//!
//! A command is only issued after its predecessor's completion event has
//! been observed. Completions that do not match the command in flight are
//! rejected and leave the state untouched. A failed step is handed to the
//! [`SetupPolicy`]; with [`NoRetry`] the sequencer stalls where it is.

use super::params::AdvertisingParameters;
use super::payload::{BeaconPayload, ServiceIdentifier};
use crate::policy::{FailureAction, NoRetry, SetupPolicy};
use crate::radio::{AdvertisingRadio, RadioError};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;

/// Progress of the beacon setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertisingState {
    Uninitialized,
    ParamsSet,
    DataSet,
    /// Steady broadcast. Terminal.
    Advertising,
}

/// One setup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvStep {
    SetParams,
    SetData,
    Start,
}

impl fmt::Display for AdvStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetParams => write!(f, "set-params"),
            Self::SetData => write!(f, "set-data"),
            Self::Start => write!(f, "start"),
        }
    }
}

/// Command issued to the advertising capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvCommand {
    SetParams(AdvertisingParameters),
    SetData {
        instance: u8,
        payload: Vec<u8>,
    },
    /// `duration` in 10 ms units and `max_events`; 0 means unlimited.
    Start {
        instance: u8,
        duration: u16,
        max_events: u8,
    },
}

impl AdvCommand {
    pub fn step(&self) -> AdvStep {
        match self {
            Self::SetParams(_) => AdvStep::SetParams,
            Self::SetData { .. } => AdvStep::SetData,
            Self::Start { .. } => AdvStep::Start,
        }
    }
}

/// Status reported by the stack for a completed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Success,
    /// Stack-specific status code.
    Failed(u32),
}

/// Completion event for one setup command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvCompletion {
    pub step: AdvStep,
    pub status: StepStatus,
}

impl AdvCompletion {
    pub fn success(step: AdvStep) -> Self {
        Self {
            step,
            status: StepStatus::Success,
        }
    }

    pub fn failed(step: AdvStep, code: u32) -> Self {
        Self {
            step,
            status: StepStatus::Failed(code),
        }
    }
}

/// What a handled completion did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvProgress {
    /// The next command was issued.
    Issued(AdvStep),
    /// The failed step was reissued.
    Retrying { step: AdvStep, attempt: u32 },
    /// The beacon is on the air.
    Advertising,
}

/// Errors raised by the sequencer.
#[derive(Debug)]
pub enum AdvertisingError {
    /// `start` called twice.
    AlreadyStarted,
    /// A completion arrived for a command that is not in flight.
    OutOfOrder {
        expected: Option<AdvStep>,
        received: AdvStep,
    },
    /// The stack reported a failure; the sequencer is stalled.
    StepFailed { step: AdvStep, code: u32 },
    /// The command could not be issued; the sequencer is stalled.
    IssueFailed { step: AdvStep, source: RadioError },
}

impl fmt::Display for AdvertisingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "advertising setup already started"),
            Self::OutOfOrder { expected, received } => match expected {
                Some(expected) => write!(
                    f,
                    "out-of-order completion: got {}, awaiting {}",
                    received, expected
                ),
                None => write!(f, "unexpected completion: got {}, nothing in flight", received),
            },
            Self::StepFailed { step, code } => {
                write!(f, "advertising step {} failed with status {}", step, code)
            }
            Self::IssueFailed { step, source } => {
                write!(f, "failed to issue advertising step {}: {}", step, source)
            }
        }
    }
}

impl std::error::Error for AdvertisingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IssueFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Drives the beacon through its setup steps.
pub struct AdvertisingSequencer {
    params: AdvertisingParameters,
    service: ServiceIdentifier,
    state: AdvertisingState,
    /// Command issued and awaiting its completion.
    in_flight: Option<AdvStep>,
    /// Step the sequencer gave up on.
    stalled: Option<AdvStep>,
    /// Consecutive failures of the current step.
    failures: u32,
    policy: Box<dyn SetupPolicy>,
}

impl AdvertisingSequencer {
    pub fn new(params: AdvertisingParameters, service: ServiceIdentifier) -> Self {
        Self::with_policy(params, service, Box::new(NoRetry))
    }

    pub fn with_policy(
        params: AdvertisingParameters,
        service: ServiceIdentifier,
        policy: Box<dyn SetupPolicy>,
    ) -> Self {
        Self {
            params,
            service,
            state: AdvertisingState::Uninitialized,
            in_flight: None,
            stalled: None,
            failures: 0,
            policy,
        }
    }

    pub fn state(&self) -> AdvertisingState {
        self.state
    }

    pub fn in_flight(&self) -> Option<AdvStep> {
        self.in_flight
    }

    /// Step the sequencer is stalled on, if any.
    pub fn stalled(&self) -> Option<AdvStep> {
        self.stalled
    }

    /// Issue the first command.
    pub fn start<R>(&mut self, radio: &mut R) -> Result<AdvProgress, AdvertisingError>
    where
        R: AdvertisingRadio + ?Sized,
    {
        if self.state != AdvertisingState::Uninitialized
            || self.in_flight.is_some()
            || self.stalled.is_some()
        {
            return Err(AdvertisingError::AlreadyStarted);
        }
        info!(
            "Configuring extended advertising (instance {}, long range: {})",
            self.params.instance,
            self.params.is_long_range()
        );
        self.issue(radio, AdvStep::SetParams)
    }

    /// Handle a completion event from the stack.
    pub fn on_completion<R>(
        &mut self,
        completion: AdvCompletion,
        radio: &mut R,
    ) -> Result<AdvProgress, AdvertisingError>
    where
        R: AdvertisingRadio + ?Sized,
    {
        if self.in_flight != Some(completion.step) {
            warn!(
                "Ignoring {} completion in state {:?} (in flight: {:?})",
                completion.step, self.state, self.in_flight
            );
            return Err(AdvertisingError::OutOfOrder {
                expected: self.in_flight,
                received: completion.step,
            });
        }
        self.in_flight = None;

        if let StepStatus::Failed(code) = completion.status {
            error!("Advertising step {} failed, status {}", completion.step, code);
            return self.handle_failure(
                radio,
                completion.step,
                AdvertisingError::StepFailed {
                    step: completion.step,
                    code,
                },
            );
        }
        self.failures = 0;

        match completion.step {
            AdvStep::SetParams => {
                info!(
                    "Advertising params set (primary {:?}, secondary {:?})",
                    self.params.primary_phy, self.params.secondary_phy
                );
                self.state = AdvertisingState::ParamsSet;
                self.issue(radio, AdvStep::SetData)
            }
            AdvStep::SetData => {
                info!("Advertising data set");
                self.state = AdvertisingState::DataSet;
                self.issue(radio, AdvStep::Start)
            }
            AdvStep::Start => {
                info!(
                    "Advertising service {} on instance {}",
                    self.service, self.params.instance
                );
                self.state = AdvertisingState::Advertising;
                Ok(AdvProgress::Advertising)
            }
        }
    }

    fn command(&self, step: AdvStep) -> AdvCommand {
        match step {
            AdvStep::SetParams => AdvCommand::SetParams(self.params),
            AdvStep::SetData => AdvCommand::SetData {
                instance: self.params.instance,
                payload: BeaconPayload::for_service(self.service).to_bytes(),
            },
            AdvStep::Start => AdvCommand::Start {
                instance: self.params.instance,
                duration: 0,
                max_events: 0,
            },
        }
    }

    fn issue<R>(&mut self, radio: &mut R, step: AdvStep) -> Result<AdvProgress, AdvertisingError>
    where
        R: AdvertisingRadio + ?Sized,
    {
        let command = self.command(step);
        debug!("Issuing advertising command {:?}", command);
        match radio.issue(&command) {
            Ok(()) => {
                self.in_flight = Some(step);
                Ok(AdvProgress::Issued(step))
            }
            Err(source) => {
                error!("Failed to issue advertising step {}: {}", step, source);
                self.handle_failure(radio, step, AdvertisingError::IssueFailed { step, source })
            }
        }
    }

    fn handle_failure<R>(
        &mut self,
        radio: &mut R,
        step: AdvStep,
        err: AdvertisingError,
    ) -> Result<AdvProgress, AdvertisingError>
    where
        R: AdvertisingRadio + ?Sized,
    {
        self.failures += 1;
        match self.policy.on_failure(self.failures) {
            FailureAction::Retry => {
                let attempt = self.failures;
                warn!("Retrying advertising step {} (attempt {})", step, attempt + 1);
                match self.issue(radio, step)? {
                    AdvProgress::Issued(step) => Ok(AdvProgress::Retrying { step, attempt }),
                    other => Ok(other),
                }
            }
            FailureAction::Stall => {
                error!(
                    "Advertising setup stalled at {} in state {:?}",
                    step, self.state
                );
                self.stalled = Some(step);
                Err(err)
            }
        }
    }
}
