//! Individual TWT agreement lifecycle.
//!
//! ```text
//!                 negotiate()          Confirmed(ok)
//! Unconfigured -------------> RequestSent ----------> Active <--Resumed-- Suspended
//!                                  |                    |  \--Suspended-->   |
//!                                  | Confirmed(declined)|                    |
//!                                  v                    +----TornDown-----+--+
//!                               Rejected                                  v
//!                                                                     TornDown
//! ```
//!
//! TornDown and Rejected are terminal for the connection epoch. A new epoch
//! (the station re-entering Connected) puts the negotiator back into
//! Unconfigured so it can request again.

use super::request::{AgreedSchedule, DutyCycleRequest};
use crate::policy::{FailureAction, NoRetry, SetupPolicy};
use crate::radio::{DutyCycleRadio, RadioError};
use crate::wifi::ConnectionState;
use log::{error, info, warn};
use serde::Serialize;
use std::fmt;

/// Lifecycle of the TWT agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DutyCycleState {
    Unconfigured,
    RequestSent,
    Active,
    Suspended,
    TornDown,
    Rejected,
}

impl DutyCycleState {
    /// `true` for states that end the epoch's agreement.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::TornDown | Self::Rejected)
    }
}

/// Outcome of a setup request as reported by the AP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStatus {
    Accepted(AgreedSchedule),
    /// Driver-specific status code.
    Declined(i32),
}

/// TWT lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwtEvent {
    SetupConfirmed(SetupStatus),
    TornDown,
    Suspended,
    Resumed,
}

/// Errors raised by the negotiator.
#[derive(Debug)]
pub enum NegotiationError {
    /// The station link is not up.
    NotConnected(ConnectionState),
    /// A request was already made in this epoch.
    InvalidState(DutyCycleState),
    /// The request could not be sent. State stays Unconfigured.
    SendFailed(RadioError),
    /// The event is not valid in the current state.
    UnexpectedEvent {
        state: DutyCycleState,
        event: TwtEvent,
    },
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected(state) => {
                write!(f, "cannot negotiate TWT while station is {:?}", state)
            }
            Self::InvalidState(state) => {
                write!(f, "TWT request not allowed in state {:?}", state)
            }
            Self::SendFailed(e) => write!(f, "TWT request failed: {}", e),
            Self::UnexpectedEvent { state, event } => {
                write!(f, "unexpected TWT event {:?} in state {:?}", event, state)
            }
        }
    }
}

impl std::error::Error for NegotiationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SendFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Tracks the TWT agreement for the current connection epoch.
pub struct Negotiator {
    state: DutyCycleState,
    epoch: u64,
    agreed: Option<AgreedSchedule>,
    policy: Box<dyn SetupPolicy>,
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl Negotiator {
    pub fn new() -> Self {
        Self::with_policy(Box::new(NoRetry))
    }

    pub fn with_policy(policy: Box<dyn SetupPolicy>) -> Self {
        Self {
            state: DutyCycleState::Unconfigured,
            epoch: 0,
            agreed: None,
            policy,
        }
    }

    pub fn state(&self) -> DutyCycleState {
        self.state
    }

    /// Connection epoch this negotiator is tracking.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Schedule in force, only while Active.
    pub fn active_schedule(&self) -> Option<AgreedSchedule> {
        match self.state {
            DutyCycleState::Active => self.agreed,
            _ => None,
        }
    }

    /// Schedule accepted by the AP in this epoch, including while suspended.
    pub fn agreed_schedule(&self) -> Option<AgreedSchedule> {
        match self.state {
            DutyCycleState::Active | DutyCycleState::Suspended => self.agreed,
            _ => None,
        }
    }

    /// Start tracking a new connection epoch.
    pub fn begin_epoch(&mut self, epoch: u64) {
        if self.state != DutyCycleState::Unconfigured {
            info!(
                "TWT state reset for epoch {} (was {:?})",
                epoch, self.state
            );
        }
        self.epoch = epoch;
        self.state = DutyCycleState::Unconfigured;
        self.agreed = None;
    }

    /// End the current epoch when the link drops. Events for the old
    /// agreement are rejected until the next [`Negotiator::begin_epoch`].
    pub fn link_lost(&mut self) {
        if self.state != DutyCycleState::Unconfigured {
            info!("TWT agreement dropped with the link (was {:?})", self.state);
        }
        self.state = DutyCycleState::Unconfigured;
        self.agreed = None;
    }

    /// Send the setup request. Does not wait for the AP's answer.
    pub fn negotiate<R>(
        &mut self,
        connection: ConnectionState,
        request: &DutyCycleRequest,
        radio: &mut R,
    ) -> Result<(), NegotiationError>
    where
        R: DutyCycleRadio + ?Sized,
    {
        if connection != ConnectionState::Connected {
            return Err(NegotiationError::NotConnected(connection));
        }
        if self.state != DutyCycleState::Unconfigured {
            return Err(NegotiationError::InvalidState(self.state));
        }

        let mut failures = 0;
        loop {
            match radio.request(request) {
                Ok(()) => {
                    info!(
                        "TWT request sent (period {:?}, wake {:?}); awaiting setup",
                        request.period(),
                        request.wake_duration()
                    );
                    self.state = DutyCycleState::RequestSent;
                    return Ok(());
                }
                Err(e) => {
                    failures += 1;
                    match self.policy.on_failure(failures) {
                        FailureAction::Retry => {
                            warn!("TWT request failed ({}), retrying", e);
                        }
                        FailureAction::Stall => {
                            error!("TWT request failed: {}", e);
                            return Err(NegotiationError::SendFailed(e));
                        }
                    }
                }
            }
        }
    }

    /// Apply a lifecycle event from the driver.
    pub fn on_event(&mut self, event: TwtEvent) -> Result<DutyCycleState, NegotiationError> {
        use DutyCycleState::*;

        let next = match (self.state, event) {
            (RequestSent, TwtEvent::SetupConfirmed(SetupStatus::Accepted(agreed))) => {
                info!(
                    "TWT setup confirmed by AP (period {:?}, wake {:?})",
                    agreed.period(),
                    agreed.wake_duration()
                );
                self.agreed = Some(agreed);
                Active
            }
            (RequestSent, TwtEvent::SetupConfirmed(SetupStatus::Declined(code))) => {
                error!("TWT setup declined by AP (status {})", code);
                Rejected
            }
            (Active, TwtEvent::Suspended) => {
                info!("TWT suspended");
                Suspended
            }
            (Suspended, TwtEvent::Resumed) => {
                info!("TWT resumed");
                Active
            }
            (Active | Suspended, TwtEvent::TornDown) => {
                warn!("TWT torn down");
                self.agreed = None;
                TornDown
            }
            (state, event) => {
                warn!("Ignoring TWT event {:?} in state {:?}", event, state);
                return Err(NegotiationError::UnexpectedEvent { state, event });
            }
        };

        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RetryUpTo;

    #[derive(Default)]
    struct FakeRadio {
        sent: usize,
        failures_left: usize,
    }

    impl DutyCycleRadio for FakeRadio {
        fn request(&mut self, _request: &DutyCycleRequest) -> Result<(), RadioError> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(RadioError::Unsupported("responder mode"));
            }
            self.sent += 1;
            Ok(())
        }
    }

    fn accepted() -> TwtEvent {
        TwtEvent::SetupConfirmed(SetupStatus::Accepted(AgreedSchedule::from_request(
            &DutyCycleRequest::default(),
        )))
    }

    fn sent_negotiator(radio: &mut FakeRadio) -> Negotiator {
        let mut negotiator = Negotiator::new();
        negotiator
            .negotiate(
                ConnectionState::Connected,
                &DutyCycleRequest::default(),
                radio,
            )
            .unwrap();
        negotiator
    }

    #[test]
    fn test_negotiate_sends_once() {
        let mut radio = FakeRadio::default();
        let mut negotiator = sent_negotiator(&mut radio);
        assert_eq!(negotiator.state(), DutyCycleState::RequestSent);
        assert_eq!(radio.sent, 1);

        let err = negotiator
            .negotiate(
                ConnectionState::Connected,
                &DutyCycleRequest::default(),
                &mut radio,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::InvalidState(DutyCycleState::RequestSent)
        ));
        assert_eq!(radio.sent, 1);
    }

    #[test]
    fn test_negotiate_requires_connection() {
        let mut radio = FakeRadio::default();
        let mut negotiator = Negotiator::new();
        for state in [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::Failed,
        ] {
            let err = negotiator
                .negotiate(state, &DutyCycleRequest::default(), &mut radio)
                .unwrap_err();
            assert!(matches!(err, NegotiationError::NotConnected(s) if s == state));
        }
        assert_eq!(negotiator.state(), DutyCycleState::Unconfigured);
        assert_eq!(radio.sent, 0);
    }

    #[test]
    fn test_send_failure_keeps_unconfigured() {
        let mut radio = FakeRadio {
            failures_left: 1,
            ..Default::default()
        };
        let mut negotiator = Negotiator::new();
        let err = negotiator
            .negotiate(
                ConnectionState::Connected,
                &DutyCycleRequest::default(),
                &mut radio,
            )
            .unwrap_err();
        assert!(matches!(err, NegotiationError::SendFailed(_)));
        assert_eq!(negotiator.state(), DutyCycleState::Unconfigured);
        assert_eq!(radio.sent, 0);
    }

    #[test]
    fn test_retry_policy_resends() {
        let mut radio = FakeRadio {
            failures_left: 2,
            ..Default::default()
        };
        let mut negotiator = Negotiator::with_policy(Box::new(RetryUpTo(2)));
        negotiator
            .negotiate(
                ConnectionState::Connected,
                &DutyCycleRequest::default(),
                &mut radio,
            )
            .unwrap();
        assert_eq!(negotiator.state(), DutyCycleState::RequestSent);
        assert_eq!(radio.sent, 1);
    }

    #[test]
    fn test_confirmed_activates() {
        let mut radio = FakeRadio::default();
        let mut negotiator = sent_negotiator(&mut radio);
        assert_eq!(negotiator.on_event(accepted()).unwrap(), DutyCycleState::Active);
        assert_eq!(
            negotiator.active_schedule().map(|s| s.period()),
            Some(DutyCycleRequest::default().period())
        );
    }

    #[test]
    fn test_confirmed_while_unconfigured_rejected() {
        let mut negotiator = Negotiator::new();
        let err = negotiator.on_event(accepted()).unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::UnexpectedEvent {
                state: DutyCycleState::Unconfigured,
                ..
            }
        ));
        assert_eq!(negotiator.state(), DutyCycleState::Unconfigured);
        assert!(negotiator.active_schedule().is_none());
    }

    #[test]
    fn test_declined_is_rejected_and_terminal() {
        let mut radio = FakeRadio::default();
        let mut negotiator = sent_negotiator(&mut radio);
        let state = negotiator
            .on_event(TwtEvent::SetupConfirmed(SetupStatus::Declined(-1)))
            .unwrap();
        assert_eq!(state, DutyCycleState::Rejected);
        assert!(state.is_terminal());
        for event in [accepted(), TwtEvent::Resumed, TwtEvent::Suspended, TwtEvent::TornDown] {
            assert!(negotiator.on_event(event).is_err());
        }
        assert_eq!(negotiator.state(), DutyCycleState::Rejected);
    }

    #[test]
    fn test_suspend_resume_teardown() {
        let mut radio = FakeRadio::default();
        let mut negotiator = sent_negotiator(&mut radio);
        negotiator.on_event(accepted()).unwrap();

        assert_eq!(
            negotiator.on_event(TwtEvent::Suspended).unwrap(),
            DutyCycleState::Suspended
        );
        assert!(negotiator.active_schedule().is_none());
        assert!(negotiator.agreed_schedule().is_some());
        assert!(negotiator.on_event(TwtEvent::Suspended).is_err());

        assert_eq!(
            negotiator.on_event(TwtEvent::Resumed).unwrap(),
            DutyCycleState::Active
        );
        assert!(negotiator.on_event(TwtEvent::Resumed).is_err());

        negotiator.on_event(TwtEvent::Suspended).unwrap();
        assert_eq!(
            negotiator.on_event(TwtEvent::TornDown).unwrap(),
            DutyCycleState::TornDown
        );
        assert!(negotiator.agreed_schedule().is_none());
        assert!(negotiator.on_event(TwtEvent::Resumed).is_err());
    }

    #[test]
    fn test_no_transition_skips_request_sent() {
        let mut negotiator = Negotiator::new();
        for event in [TwtEvent::Suspended, TwtEvent::Resumed, TwtEvent::TornDown] {
            assert!(negotiator.on_event(event).is_err());
            assert_eq!(negotiator.state(), DutyCycleState::Unconfigured);
        }
    }

    #[test]
    fn test_new_epoch_resets_terminal_state() {
        let mut radio = FakeRadio::default();
        let mut negotiator = sent_negotiator(&mut radio);
        negotiator.on_event(accepted()).unwrap();
        negotiator.on_event(TwtEvent::TornDown).unwrap();

        negotiator.begin_epoch(2);
        assert_eq!(negotiator.state(), DutyCycleState::Unconfigured);
        assert_eq!(negotiator.epoch(), 2);

        negotiator
            .negotiate(
                ConnectionState::Connected,
                &DutyCycleRequest::default(),
                &mut radio,
            )
            .unwrap();
        assert_eq!(radio.sent, 2);
    }

    #[test]
    fn test_link_lost_rejects_old_agreement_events() {
        let mut radio = FakeRadio::default();
        let mut negotiator = sent_negotiator(&mut radio);
        negotiator.on_event(accepted()).unwrap();
        negotiator.on_event(TwtEvent::Suspended).unwrap();

        negotiator.link_lost();
        assert_eq!(negotiator.state(), DutyCycleState::Unconfigured);
        assert!(negotiator.agreed_schedule().is_none());

        assert!(negotiator.on_event(TwtEvent::Resumed).is_err());
        assert!(negotiator.on_event(accepted()).is_err());
        assert_eq!(negotiator.state(), DutyCycleState::Unconfigured);
        assert!(negotiator.active_schedule().is_none());
    }
}
