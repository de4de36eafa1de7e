use std::sync::Arc;
use std::time::Duration;

use manager_core::{ActivityClock, Endpoint, ManagerConfig, WorkerSpec};
use platform::{ContainerInfo, ContainerPlatform, PlatformError};
use stdio::Style;
use tokio::sync::Mutex;

use crate::error::LifecycleError;
use crate::health::{HealthProbe, poll_health};
use crate::state::WorkerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub health_interval: Duration,
    pub health_attempts: u32,
}

impl ControllerSettings {
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            health_interval: config.health_interval,
            health_attempts: config.health_attempts,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(1),
            health_attempts: 30,
        }
    }
}

/// Result of one idle check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Activity is within the threshold.
    Active,
    NotRunning,
    Stopped { idle: Duration },
    StopFailed { reason: String },
}

/// What the provisioning section did before health polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartAction {
    None,
    Deployed,
    Restarted,
    Replaced,
}

/// Owns every lifecycle operation on the worker container.
///
/// Create and start are serialized by `provision`; idle stops take the same
/// lock so a stop never interleaves with a start. Health polling and request
/// forwarding run outside it.
pub struct LifecycleController {
    platform: Arc<dyn ContainerPlatform>,
    probe: Arc<dyn HealthProbe>,
    activity: Arc<ActivityClock>,
    spec: WorkerSpec,
    endpoint: Endpoint,
    settings: ControllerSettings,
    provision: Mutex<()>,
}

impl LifecycleController {
    pub fn new(
        platform: Arc<dyn ContainerPlatform>,
        probe: Arc<dyn HealthProbe>,
        activity: Arc<ActivityClock>,
        spec: WorkerSpec,
        settings: ControllerSettings,
    ) -> Self {
        let endpoint = spec.endpoint();
        Self {
            platform,
            probe,
            activity,
            spec,
            endpoint,
            settings,
            provision: Mutex::new(()),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    pub fn activity(&self) -> &Arc<ActivityClock> {
        &self.activity
    }

    /// Query the platform and, when the container runs, probe it.
    pub async fn state(&self) -> Result<WorkerState, PlatformError> {
        let Some(info) = self.lookup().await? else {
            return Ok(WorkerState::Absent);
        };
        if !info.status.is_running() {
            return Ok(WorkerState::Stopped);
        }
        if self.probe.check(&self.endpoint).await {
            Ok(WorkerState::HealthyRunning)
        } else {
            Ok(WorkerState::Running)
        }
    }

    /// Bring the worker to a healthy state and return its endpoint.
    ///
    /// Safe to call concurrently: exactly one caller provisions, the rest
    /// observe the running container and go straight to health polling.
    pub async fn ensure_running(&self) -> Result<Endpoint, LifecycleError> {
        let state = self.state().await.map_err(|err| self.provision_failed(err))?;
        // A held lock means a start or an idle stop is in flight.
        if state == WorkerState::HealthyRunning && self.provision.try_lock().is_ok() {
            return Ok(self.endpoint.clone());
        }

        let action = {
            let _guard = self.provision.lock().await;
            self.provision_locked().await?
        };

        match poll_health(
            self.probe.as_ref(),
            &self.endpoint,
            self.settings.health_interval,
            self.settings.health_attempts,
        )
        .await
        {
            Ok(attempt) => {
                if action != StartAction::None {
                    stdio::success(
                        "CONTAINER",
                        &format!("Worker is now active at {} (attempt {})", self.endpoint, attempt),
                    );
                } else {
                    tracing::debug!(attempt, "worker became healthy");
                }
                Ok(self.endpoint.clone())
            }
            Err(timeout) => {
                stdio::error(
                    "CRITICAL",
                    &format!(
                        "Worker at {} not healthy after {} attempts; leaving it running",
                        self.endpoint, timeout.attempts
                    ),
                );
                Err(LifecycleError::StartupTimeout {
                    attempts: timeout.attempts,
                    endpoint: self.endpoint.clone(),
                })
            }
        }
    }

    /// [`ensure_running`](Self::ensure_running) on its own task, so dropping
    /// the caller (a disconnected client) does not abandon a cold start.
    pub async fn ensure_running_detached(self: &Arc<Self>) -> Result<Endpoint, LifecycleError> {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.ensure_running().await })
            .await
            .map_err(|err| LifecycleError::provision(format!("startup task failed: {}", err)))?
    }

    /// Stop the worker when it runs and activity is older than `threshold`.
    /// Failures are reported in the outcome, never raised.
    pub async fn stop_if_idle(&self, threshold: Duration) -> ReapOutcome {
        let _guard = self.provision.lock().await;
        if !self.activity.is_idle_past(threshold) {
            return ReapOutcome::Active;
        }

        match self.lookup().await {
            Ok(Some(info)) if info.status.is_running() => {}
            Ok(_) => return ReapOutcome::NotRunning,
            Err(err) => {
                tracing::warn!(
                    container = %self.spec.name,
                    error = %err,
                    "idle check could not query worker"
                );
                return ReapOutcome::StopFailed {
                    reason: err.to_string(),
                };
            }
        }

        // A request may have arrived while the lookup was pending.
        if !self.activity.is_idle_past(threshold) {
            return ReapOutcome::Active;
        }
        let idle = self.activity.idle_for();

        stdio::eventf!(
            "AUTO-SCALING",
            Style::Warning,
            "Worker idle for {}s. Stopping...",
            idle.as_secs()
        );
        match self.platform.stop(&self.spec.name).await {
            Ok(()) => ReapOutcome::Stopped { idle },
            Err(PlatformError::NotModified(_)) | Err(PlatformError::NotFound(_)) => {
                ReapOutcome::NotRunning
            }
            Err(err) => {
                tracing::warn!(
                    container = %self.spec.name,
                    error = %err,
                    "failed to stop idle worker"
                );
                stdio::warn("AUTO-SCALING", &format!("Stop failed: {}", err));
                ReapOutcome::StopFailed {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Stop the worker regardless of activity. Returns whether it was running.
    pub async fn stop_now(&self) -> Result<bool, PlatformError> {
        let _guard = self.provision.lock().await;
        match self.lookup().await? {
            Some(info) if info.status.is_running() => {}
            _ => return Ok(false),
        }
        match self.platform.stop(&self.spec.name).await {
            Ok(()) => Ok(true),
            Err(PlatformError::NotModified(_)) | Err(PlatformError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Must be called with `provision` held.
    async fn provision_locked(&self) -> Result<StartAction, LifecycleError> {
        let info = self
            .lookup()
            .await
            .map_err(|err| self.provision_failed(err))?;

        let result = match info {
            Some(info) if info.status.is_running() => Ok(StartAction::None),
            None => self.deploy().await.map(|_| StartAction::Deployed),
            Some(info) if info.status.is_restartable() => self.restart().await,
            Some(info) => self.replace(info).await.map(|_| StartAction::Replaced),
        };
        result.map_err(|err| self.provision_failed(err))
    }

    async fn deploy(&self) -> Result<(), PlatformError> {
        stdio::eventf!(
            "DEPLOY",
            Style::Warning,
            "Provisioning new container {} from {}...",
            self.spec.name,
            self.spec.image
        );
        match self.platform.run(&self.spec).await {
            Ok(info) => {
                tracing::info!(container = %info.name, id = %info.id, "worker container created");
                Ok(())
            }
            // Already exists: make sure it is started.
            Err(err) if err.is_already_done() => {
                tracing::debug!(container = %self.spec.name, error = %err, "worker already exists");
                self.start_tolerant().await
            }
            Err(err) => Err(err),
        }
    }

    async fn restart(&self) -> Result<StartAction, PlatformError> {
        stdio::eventf!(
            "COLD START",
            Style::Warning,
            "Waking up stopped container {}...",
            self.spec.name
        );
        match self.platform.start(&self.spec.name).await {
            Ok(()) => Ok(StartAction::Restarted),
            Err(err) if err.is_already_done() => Ok(StartAction::Restarted),
            // Vanished between lookup and start.
            Err(PlatformError::NotFound(_)) => {
                self.deploy().await.map(|_| StartAction::Deployed)
            }
            Err(err) => Err(err),
        }
    }

    /// Remove a container in a state that cannot simply be started, then
    /// create a fresh one.
    async fn replace(&self, stale: ContainerInfo) -> Result<(), PlatformError> {
        tracing::warn!(
            container = %stale.name,
            status = %stale.status,
            "removing stale worker container"
        );
        match self.platform.remove(&stale.name).await {
            Ok(()) | Err(PlatformError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
        self.deploy().await
    }

    async fn start_tolerant(&self) -> Result<(), PlatformError> {
        match self.platform.start(&self.spec.name).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_already_done() => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn lookup(&self) -> Result<Option<ContainerInfo>, PlatformError> {
        match self.platform.get(&self.spec.name).await {
            Ok(info) => Ok(Some(info)),
            Err(PlatformError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn provision_failed(&self, err: PlatformError) -> LifecycleError {
        tracing::error!(container = %self.spec.name, error = %err, "worker provisioning failed");
        stdio::error("CRITICAL", &format!("Failed to provision worker: {}", err));
        LifecycleError::provision(err)
    }
}
