use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dataset::SampleStore;
use lifecycle::{ControllerSettings, HealthProbe, IdleReaper, LifecycleController};
use manager_core::{ActivityClock, ManagerConfig};
use platform::ContainerPlatform;
use proxy::{Forwarder, ProxyState, app_router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A manager whose listener and reaper are running.
pub struct RunningManager {
    addr: SocketAddr,
    controller: Arc<LifecycleController>,
    shutdown: CancellationToken,
    server: JoinHandle<std::io::Result<()>>,
    reaper: JoinHandle<()>,
}

impl RunningManager {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait until the listener exits, either on shutdown or on error.
    pub async fn wait(self) -> anyhow::Result<()> {
        let result = self.server.await.context("listener task panicked")?;
        self.shutdown.cancel();
        if let Err(err) = self.reaper.await {
            tracing::warn!(error = %err, "idle reaper task ended abnormally");
        }
        result.context("listener failed")
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        self.wait().await
    }
}

/// Bind the listener, start the idle reaper and warm the simulation data.
pub async fn start(
    config: &ManagerConfig,
    platform: Arc<dyn ContainerPlatform>,
    probe: Arc<dyn HealthProbe>,
) -> anyhow::Result<RunningManager> {
    let activity = Arc::new(ActivityClock::new());
    let controller = Arc::new(LifecycleController::new(
        platform,
        probe,
        activity,
        config.worker.clone(),
        ControllerSettings::from_config(config),
    ));

    let samples = Arc::new(SampleStore::new(&config.dataset_path));
    let warm = Arc::clone(&samples);
    tokio::spawn(async move {
        // Errors are logged by the store and retried on first request.
        let _ = warm.dataset().await;
    });

    let forwarder = Forwarder::new(config.forward_timeout).context("failed to build HTTP client")?;
    let state = Arc::new(ProxyState::new(
        Arc::clone(&controller),
        forwarder,
        samples,
        config,
    ));
    let app = app_router(state);

    let bind = config.listen_addr()?;
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, worker = %controller.endpoint(), "manager listening");

    let shutdown = CancellationToken::new();
    let reaper = IdleReaper::new(
        Arc::clone(&controller),
        config.idle_timeout,
        config.reaper_interval,
    )
    .spawn(shutdown.clone());

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    Ok(RunningManager {
        addr,
        controller,
        shutdown,
        server,
        reaper,
    })
}
