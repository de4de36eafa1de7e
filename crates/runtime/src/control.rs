//! One-shot operator commands against the worker container.

use std::sync::Arc;

use anyhow::Context;
use lifecycle::{ControllerSettings, HttpHealthProbe, LifecycleController, WorkerState};
use manager_core::{ActivityClock, ManagerConfig};
use platform::DockerPlatform;

fn controller(config: &ManagerConfig) -> anyhow::Result<LifecycleController> {
    let platform = DockerPlatform::connect(config.stop_grace, config.pull_missing_image)
        .context("failed to connect to docker")?;
    let probe = HttpHealthProbe::new(config.probe_timeout).context("failed to build health probe")?;
    Ok(LifecycleController::new(
        Arc::new(platform),
        Arc::new(probe),
        Arc::new(ActivityClock::new()),
        config.worker.clone(),
        ControllerSettings::from_config(config),
    ))
}

fn block_on<F: std::future::Future>(future: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    Ok(rt.block_on(future))
}

pub fn status(config: &ManagerConfig) -> anyhow::Result<WorkerState> {
    block_on(async {
        let controller = controller(config)?;
        controller
            .state()
            .await
            .context("failed to query worker container")
    })?
}

/// Stop the worker now. Returns whether it was running.
pub fn stop(config: &ManagerConfig) -> anyhow::Result<bool> {
    block_on(async {
        let controller = controller(config)?;
        controller
            .stop_now()
            .await
            .context("failed to stop worker container")
    })?
}
