use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::controller::{LifecycleController, ReapOutcome};

/// tokio intervals panic on a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic idle check. Reads the activity clock and asks the controller to
/// stop the worker once it has been idle past the threshold. Never writes
/// the clock.
pub struct IdleReaper {
    controller: Arc<LifecycleController>,
    threshold: Duration,
    interval: Duration,
}

impl IdleReaper {
    pub fn new(
        controller: Arc<LifecycleController>,
        threshold: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            controller,
            threshold,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// One wake-up of the reaper.
    pub async fn tick(&self) -> ReapOutcome {
        if !self.controller.activity().is_idle_past(self.threshold) {
            return ReapOutcome::Active;
        }
        let outcome = self.controller.stop_if_idle(self.threshold).await;
        match &outcome {
            ReapOutcome::Stopped { idle } => {
                tracing::info!(idle_secs = idle.as_secs(), "worker stopped after idle period");
            }
            ReapOutcome::StopFailed { reason } => {
                tracing::warn!(reason = %reason, "idle stop failed; will retry next tick");
            }
            ReapOutcome::Active | ReapOutcome::NotRunning => {}
        }
        outcome
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of `interval` completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        tracing::debug!("idle reaper stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
