use std::sync::Arc;

use anyhow::Context;
use lifecycle::HttpHealthProbe;
use manager_core::ManagerConfig;
use platform::DockerPlatform;

pub fn serve(config: ManagerConfig) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    rt.block_on(serve_async(config))
}

async fn serve_async(config: ManagerConfig) -> anyhow::Result<()> {
    stdio::banner("ENGINE CARE MANAGER", "Zero-Ops Orchestrator Online");

    let platform = DockerPlatform::connect(config.stop_grace, config.pull_missing_image)
        .context("failed to connect to docker")?;
    let probe = HttpHealthProbe::new(config.probe_timeout).context("failed to build health probe")?;

    let manager = crate::start(&config, Arc::new(platform), Arc::new(probe)).await?;
    stdio::eventf!(
        "SYSTEM",
        stdio::Style::Info,
        "Listening on {} (worker {} -> {}, idle timeout {}s)",
        manager.local_addr(),
        config.worker.name,
        manager.controller().endpoint(),
        config.idle_timeout.as_secs()
    );

    let shutdown = manager.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => stdio::error("SYSTEM", "Shutting down Manager..."),
            Err(err) => tracing::warn!(error = %err, "failed to listen for ctrl-c"),
        }
        shutdown.cancel();
    });

    manager.wait().await
}
