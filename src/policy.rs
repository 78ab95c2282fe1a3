//! Failure policy for one-shot setup commands.
//!
//! TWT negotiation and advertising setup do not retry on failure. The
//! decision lives behind [`SetupPolicy`] so a stricter policy can be plugged
//! into the state machines without changing their transitions.

/// What a state machine does after a setup step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Report and stay in the current state.
    Stall,
    /// Reissue the failed command.
    Retry,
}

/// Decides how to react to a failed setup step.
pub trait SetupPolicy: Send + Sync {
    /// `failures` counts consecutive failures of the current step,
    /// starting at 1.
    fn on_failure(&self, failures: u32) -> FailureAction;
}

/// Never retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl SetupPolicy for NoRetry {
    fn on_failure(&self, _failures: u32) -> FailureAction {
        FailureAction::Stall
    }
}

/// Retry a failed step up to `n` times, then stall.
#[derive(Debug, Clone, Copy)]
pub struct RetryUpTo(pub u32);

impl SetupPolicy for RetryUpTo {
    fn on_failure(&self, failures: u32) -> FailureAction {
        if failures <= self.0 {
            FailureAction::Retry
        } else {
            FailureAction::Stall
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_retry_always_stalls() {
        assert_eq!(NoRetry.on_failure(1), FailureAction::Stall);
        assert_eq!(NoRetry.on_failure(100), FailureAction::Stall);
    }

    #[test]
    fn test_retry_up_to_bound() {
        let policy = RetryUpTo(2);
        assert_eq!(policy.on_failure(1), FailureAction::Retry);
        assert_eq!(policy.on_failure(2), FailureAction::Retry);
        assert_eq!(policy.on_failure(3), FailureAction::Stall);
        assert_eq!(RetryUpTo(0).on_failure(1), FailureAction::Stall);
    }
}
