use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use manager_core::WorkerSpec;

use crate::{ContainerInfo, ContainerPlatform, ContainerStatus, PlatformError};

/// Call counts observed by an [`InMemoryPlatform`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub get: usize,
    pub run: usize,
    pub start: usize,
    pub stop: usize,
    pub remove: usize,
}

#[derive(Debug, Default)]
struct Counters {
    get: AtomicUsize,
    run: AtomicUsize,
    start: AtomicUsize,
    stop: AtomicUsize,
    remove: AtomicUsize,
}

#[derive(Debug, Default)]
struct Faults {
    run: Option<PlatformError>,
    start: Option<PlatformError>,
    stop: Option<PlatformError>,
}

/// Container platform that keeps containers in a map.
///
/// Behaves like the Docker daemon for the operations the controller uses:
/// `run` on an existing name is a `Conflict`, `start` on a running container
/// is `NotModified`, and so on. Faults and latency can be injected.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    containers: Mutex<HashMap<String, ContainerInfo>>,
    counters: Counters,
    faults: Mutex<Faults>,
    run_delay: Mutex<Duration>,
    get_delay: Mutex<Duration>,
    stop_delay: Mutex<Duration>,
    next_id: AtomicUsize,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a container with `status` as if it had been created externally.
    pub fn insert(&self, name: &str, status: ContainerStatus) {
        let id = self.allocate_id();
        self.lock_containers().insert(
            name.to_string(),
            ContainerInfo {
                id,
                name: name.to_string(),
                status,
            },
        );
    }

    pub fn set_status(&self, name: &str, status: ContainerStatus) {
        if let Some(info) = self.lock_containers().get_mut(name) {
            info.status = status;
        }
    }

    pub fn status(&self, name: &str) -> Option<ContainerStatus> {
        self.lock_containers().get(name).map(|info| info.status)
    }

    pub fn container_count(&self) -> usize {
        self.lock_containers().len()
    }

    /// Make every following `run` fail with `err` (or succeed with `None`).
    pub fn fail_run(&self, err: Option<PlatformError>) {
        self.lock_faults().run = err;
    }

    pub fn fail_start(&self, err: Option<PlatformError>) {
        self.lock_faults().start = err;
    }

    pub fn fail_stop(&self, err: Option<PlatformError>) {
        self.lock_faults().stop = err;
    }

    /// Sleep this long inside `run` before the container appears.
    pub fn set_run_delay(&self, delay: Duration) {
        *self.run_delay.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    /// Sleep this long inside `get` before answering.
    pub fn set_get_delay(&self, delay: Duration) {
        *self.get_delay.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    /// Sleep this long inside `stop` before the container exits.
    pub fn set_stop_delay(&self, delay: Duration) {
        *self.stop_delay.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            get: self.counters.get.load(Ordering::SeqCst),
            run: self.counters.run.load(Ordering::SeqCst),
            start: self.counters.start.load(Ordering::SeqCst),
            stop: self.counters.stop.load(Ordering::SeqCst),
            remove: self.counters.remove.load(Ordering::SeqCst),
        }
    }

    fn allocate_id(&self) -> String {
        format!("mem-{:04}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn lock_containers(&self) -> std::sync::MutexGuard<'_, HashMap<String, ContainerInfo>> {
        self.containers.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn pause(delay: &Mutex<Duration>) {
        let delay = *delay.lock().unwrap_or_else(|p| p.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ContainerPlatform for InMemoryPlatform {
    async fn get(&self, name: &str) -> Result<ContainerInfo, PlatformError> {
        self.counters.get.fetch_add(1, Ordering::SeqCst);
        Self::pause(&self.get_delay).await;
        self.lock_containers()
            .get(name)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("No such container: {}", name)))
    }

    async fn run(&self, spec: &WorkerSpec) -> Result<ContainerInfo, PlatformError> {
        self.counters.run.fetch_add(1, Ordering::SeqCst);
        Self::pause(&self.run_delay).await;
        if let Some(err) = self.lock_faults().run.clone() {
            return Err(err);
        }

        let mut containers = self.lock_containers();
        if containers.contains_key(&spec.name) {
            return Err(PlatformError::Conflict(format!(
                "container name \"{}\" is already in use",
                spec.name
            )));
        }
        let info = ContainerInfo {
            id: self.allocate_id(),
            name: spec.name.clone(),
            status: ContainerStatus::Running,
        };
        containers.insert(spec.name.clone(), info.clone());
        Ok(info)
    }

    async fn start(&self, name: &str) -> Result<(), PlatformError> {
        self.counters.start.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.lock_faults().start.clone() {
            return Err(err);
        }
        let mut containers = self.lock_containers();
        let info = containers
            .get_mut(name)
            .ok_or_else(|| PlatformError::NotFound(format!("No such container: {}", name)))?;
        match info.status {
            ContainerStatus::Running | ContainerStatus::Restarting => Err(
                PlatformError::NotModified(format!("container {} already started", name)),
            ),
            ContainerStatus::Created | ContainerStatus::Exited => {
                info.status = ContainerStatus::Running;
                Ok(())
            }
            other => Err(PlatformError::Api(format!(
                "cannot start container {} in state {}",
                name, other
            ))),
        }
    }

    async fn stop(&self, name: &str) -> Result<(), PlatformError> {
        self.counters.stop.fetch_add(1, Ordering::SeqCst);
        Self::pause(&self.stop_delay).await;
        if let Some(err) = self.lock_faults().stop.clone() {
            return Err(err);
        }
        let mut containers = self.lock_containers();
        let info = containers
            .get_mut(name)
            .ok_or_else(|| PlatformError::NotFound(format!("No such container: {}", name)))?;
        if !info.status.is_running() {
            return Err(PlatformError::NotModified(format!(
                "container {} already stopped",
                name
            )));
        }
        info.status = ContainerStatus::Exited;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), PlatformError> {
        self.counters.remove.fetch_add(1, Ordering::SeqCst);
        self.lock_containers()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PlatformError::NotFound(format!("No such container: {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_then_conflict_on_duplicate_name() {
        let platform = InMemoryPlatform::new();
        let spec = WorkerSpec::default();
        let info = platform.run(&spec).await.unwrap();
        assert_eq!(info.status, ContainerStatus::Running);

        let err = platform.run(&spec).await.unwrap_err();
        assert!(err.is_already_done());
        assert_eq!(platform.container_count(), 1);
        assert_eq!(platform.calls().run, 2);
    }

    #[tokio::test]
    async fn stop_and_start_cycle() {
        let platform = InMemoryPlatform::new();
        platform.insert("engine-worker", ContainerStatus::Running);

        platform.stop("engine-worker").await.unwrap();
        assert_eq!(platform.status("engine-worker"), Some(ContainerStatus::Exited));
        assert!(matches!(
            platform.stop("engine-worker").await,
            Err(PlatformError::NotModified(_))
        ));

        platform.start("engine-worker").await.unwrap();
        assert!(matches!(
            platform.start("engine-worker").await,
            Err(PlatformError::NotModified(_))
        ));
    }

    #[tokio::test]
    async fn missing_container_is_not_found() {
        let platform = InMemoryPlatform::new();
        assert!(matches!(
            platform.get("engine-worker").await,
            Err(PlatformError::NotFound(_))
        ));
        assert!(matches!(
            platform.remove("engine-worker").await,
            Err(PlatformError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn injected_run_fault() {
        let platform = InMemoryPlatform::new();
        platform.fail_run(Some(PlatformError::Api("daemon unavailable".to_string())));
        assert!(platform.run(&WorkerSpec::default()).await.is_err());
        assert_eq!(platform.container_count(), 0);

        platform.fail_run(None);
        assert!(platform.run(&WorkerSpec::default()).await.is_ok());
    }
}
