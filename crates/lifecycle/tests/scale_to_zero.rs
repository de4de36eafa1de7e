use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lifecycle::{
    ControllerSettings, HealthProbe, IdleReaper, LifecycleController, LifecycleError, ReapOutcome,
    WorkerState,
};
use manager_core::{ActivityClock, Endpoint, WorkerSpec};
use platform::{ContainerStatus, InMemoryPlatform};
use tokio_util::sync::CancellationToken;

/// Healthy exactly when the fake container is running, unless muted.
struct PlatformProbe {
    platform: Arc<InMemoryPlatform>,
    muted: AtomicBool,
}

#[async_trait]
impl HealthProbe for PlatformProbe {
    async fn check(&self, _endpoint: &Endpoint) -> bool {
        !self.muted.load(Ordering::SeqCst)
            && self.platform.status("engine-worker") == Some(ContainerStatus::Running)
    }
}

struct Harness {
    platform: Arc<InMemoryPlatform>,
    probe: Arc<PlatformProbe>,
    activity: Arc<ActivityClock>,
    controller: Arc<LifecycleController>,
}

fn harness() -> Harness {
    let platform = Arc::new(InMemoryPlatform::new());
    let probe = Arc::new(PlatformProbe {
        platform: Arc::clone(&platform),
        muted: AtomicBool::new(false),
    });
    let activity = Arc::new(ActivityClock::new());
    let controller = Arc::new(LifecycleController::new(
        platform.clone(),
        probe.clone(),
        Arc::clone(&activity),
        WorkerSpec::default(),
        ControllerSettings {
            health_interval: Duration::from_secs(1),
            health_attempts: 30,
        },
    ));
    Harness {
        platform,
        probe,
        activity,
        controller,
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_cold_start_creates_one_container() {
    let h = harness();
    h.platform.set_run_delay(Duration::from_millis(800));

    let mut calls = Vec::new();
    for _ in 0..16 {
        let controller = Arc::clone(&h.controller);
        calls.push(tokio::spawn(async move {
            controller.ensure_running_detached().await
        }));
    }
    for call in calls {
        let endpoint = call.await.unwrap().unwrap();
        assert_eq!(endpoint.base_url(), "http://127.0.0.1:8001");
    }

    assert_eq!(h.platform.calls().run, 1);
    assert_eq!(h.platform.container_count(), 1);
    assert_eq!(h.controller.state().await.unwrap(), WorkerState::HealthyRunning);
}

#[tokio::test(start_paused = true)]
async fn idle_stop_then_reprovision_on_next_request() {
    let h = harness();
    h.activity.touch();
    h.controller.ensure_running().await.unwrap();
    assert_eq!(h.platform.calls().run, 1);

    let reaper = IdleReaper::new(
        Arc::clone(&h.controller),
        Duration::from_secs(300),
        Duration::from_secs(10),
    );
    tokio::time::advance(Duration::from_secs(301)).await;
    assert!(matches!(reaper.tick().await, ReapOutcome::Stopped { .. }));
    assert_eq!(h.controller.state().await.unwrap(), WorkerState::Stopped);

    h.activity.touch();
    assert_eq!(reaper.tick().await, ReapOutcome::Active);

    h.controller.ensure_running().await.unwrap();
    let calls = h.platform.calls();
    assert_eq!(calls.run, 1, "stopped container is restarted, not recreated");
    assert_eq!(calls.start, 1);
    assert_eq!(h.controller.state().await.unwrap(), WorkerState::HealthyRunning);
}

#[tokio::test(start_paused = true)]
async fn startup_timeout_leaves_worker_running() {
    let h = harness();
    h.probe.muted.store(true, Ordering::SeqCst);

    let started = tokio::time::Instant::now();
    let err = h.controller.ensure_running().await.unwrap_err();
    match &err {
        LifecycleError::StartupTimeout { attempts, .. } => assert_eq!(*attempts, 30),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("StartupTimeout"));
    assert_eq!(started.elapsed(), Duration::from_secs(29));
    assert_eq!(h.platform.status("engine-worker"), Some(ContainerStatus::Running));
    assert_eq!(h.controller.state().await.unwrap(), WorkerState::Running);

    // The next caller only polls again.
    h.probe.muted.store(false, Ordering::SeqCst);
    h.controller.ensure_running().await.unwrap();
    let calls = h.platform.calls();
    assert_eq!((calls.run, calls.start, calls.remove), (1, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn reaper_loop_stops_worker_and_exits_on_cancel() {
    let h = harness();
    h.controller.ensure_running().await.unwrap();

    let shutdown = CancellationToken::new();
    let handle = IdleReaper::new(
        Arc::clone(&h.controller),
        Duration::from_secs(300),
        Duration::from_secs(10),
    )
    .spawn(shutdown.clone());

    tokio::time::sleep(Duration::from_secs(295)).await;
    assert_eq!(h.platform.status("engine-worker"), Some(ContainerStatus::Running));

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(h.platform.status("engine-worker"), Some(ContainerStatus::Exited));
    assert_eq!(h.platform.calls().stop, 1);

    // Further ticks find nothing to stop.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.platform.calls().stop, 1);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn zero_interval_reaper_keeps_running() {
    let h = harness();
    h.controller.ensure_running().await.unwrap();

    let shutdown = CancellationToken::new();
    let handle = IdleReaper::new(
        Arc::clone(&h.controller),
        Duration::from_secs(300),
        Duration::ZERO,
    )
    .spawn(shutdown.clone());

    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(h.platform.status("engine-worker"), Some(ContainerStatus::Exited));
    assert!(!handle.is_finished());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reaper_never_touches_activity() {
    let h = harness();
    h.controller.ensure_running().await.unwrap();
    let before = h.activity.last_activity();

    let reaper = IdleReaper::new(
        Arc::clone(&h.controller),
        Duration::from_secs(300),
        Duration::from_secs(10),
    );
    tokio::time::advance(Duration::from_secs(600)).await;
    reaper.tick().await;
    assert_eq!(h.activity.last_activity(), before);
}

#[tokio::test(start_paused = true)]
async fn request_during_idle_lookup_cancels_stop() {
    let h = harness();
    h.controller.ensure_running().await.unwrap();
    tokio::time::advance(Duration::from_secs(301)).await;

    h.platform.set_get_delay(Duration::from_secs(2));
    let controller = Arc::clone(&h.controller);
    let reap = tokio::spawn(async move { controller.stop_if_idle(Duration::from_secs(300)).await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.activity.touch();

    assert_eq!(reap.await.unwrap(), ReapOutcome::Active);
    assert_eq!(h.platform.status("engine-worker"), Some(ContainerStatus::Running));
    assert_eq!(h.platform.calls().stop, 0);
}

#[tokio::test(start_paused = true)]
async fn request_during_idle_stop_waits_and_restarts() {
    let h = harness();
    h.controller.ensure_running().await.unwrap();
    tokio::time::advance(Duration::from_secs(301)).await;

    h.platform.set_stop_delay(Duration::from_secs(5));
    let controller = Arc::clone(&h.controller);
    let reap = tokio::spawn(async move { controller.stop_if_idle(Duration::from_secs(300)).await });

    // The stop is in flight; the container still reports running.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.platform.status("engine-worker"), Some(ContainerStatus::Running));
    h.activity.touch();
    h.controller.ensure_running().await.unwrap();

    assert!(matches!(reap.await.unwrap(), ReapOutcome::Stopped { .. }));
    assert_eq!(h.platform.status("engine-worker"), Some(ContainerStatus::Running));
    let calls = h.platform.calls();
    assert_eq!((calls.run, calls.stop, calls.start), (1, 1, 1));
}
