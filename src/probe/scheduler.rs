//! Fixed-interval probe loop.
//!
//! The first probe runs one interval after start. Each probe executes on
//! the blocking pool so the dispatcher is never held up, and is bounded
//! twice: by the prober's own timeout and by an outer async timeout.

use super::{ProbeError, ProbeResult, Prober};
use crate::config::ProbeConfig;
use crate::node::SharedState;
use crate::twt::AgreedSchedule;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Extra time allowed beyond the probe timeout before the task is abandoned.
pub const PROBE_GRACE: Duration = Duration::from_millis(500);

/// Runs the probe forever at a fixed interval.
pub struct ProbeScheduler<P: Prober> {
    config: ProbeConfig,
    prober: Arc<P>,
    state: SharedState,
    schedule: watch::Receiver<Option<AgreedSchedule>>,
}

impl<P: Prober> ProbeScheduler<P> {
    pub fn new(
        config: ProbeConfig,
        prober: P,
        state: SharedState,
        schedule: watch::Receiver<Option<AgreedSchedule>>,
    ) -> Self {
        Self {
            config,
            prober: Arc::new(prober),
            state,
            schedule,
        }
    }

    /// Interval until the next probe. Follows the agreed TWT period while
    /// alignment is enabled and an agreement is active.
    pub fn current_interval(&self) -> Duration {
        if self.config.align_to_duty_cycle {
            if let Some(agreed) = *self.schedule.borrow() {
                return agreed.period();
            }
        }
        self.config.interval
    }

    /// Run one probe and record its result.
    pub async fn probe_once(&self) -> ProbeResult {
        let prober = Arc::clone(&self.prober);
        let url = self.config.url.clone();
        let timeout = self.config.timeout;

        let task = tokio::task::spawn_blocking(move || prober.head(&url, timeout));
        let outcome = match tokio::time::timeout(timeout + PROBE_GRACE, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Err(ProbeError::Task(e.to_string())),
            Err(_) => Err(ProbeError::Timeout),
        };

        match &outcome {
            Ok(status) => info!("HTTP HEAD ok, status={}", status),
            Err(e) => warn!("HTTP HEAD failed: {}", e),
        }

        let result = ProbeResult::from(&outcome);
        self.state.record_probe(result);
        result
    }

    /// Probe until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Probing {} every {:?} (align to TWT: {})",
            self.config.url, self.config.interval, self.config.align_to_duty_cycle
        );
        loop {
            let interval = self.current_interval();
            debug!("Next probe in {:?}", interval);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.probe_once() => {}
            }
        }
        info!("Probe scheduler stopped");
    }
}
