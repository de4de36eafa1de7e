//! Container platform capability.
//!
//! The lifecycle controller only ever talks to the worker container through
//! [`ContainerPlatform`]. Production uses [`docker::DockerPlatform`]; tests and
//! local experiments use [`memory::InMemoryPlatform`].

use std::fmt;

use async_trait::async_trait;
use manager_core::WorkerSpec;

pub mod docker;
pub mod memory;

pub use docker::DockerPlatform;
pub use memory::InMemoryPlatform;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),
    /// The resource already exists or is in use.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Already started or already stopped.
    #[error("not modified: {0}")]
    NotModified(String),
    #[error("platform api error: {0}")]
    Api(String),
}

impl PlatformError {
    /// Outcomes that mean the requested state already holds.
    pub fn is_already_done(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::NotModified(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Restarting,
    Paused,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Restarting => "restarting",
            Self::Paused => "paused",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        }
    }

    /// The process inside the container is up (it may not be healthy yet).
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running | Self::Restarting)
    }

    /// Stopped cleanly and can be started again in place.
    pub fn is_restartable(&self) -> bool {
        matches!(self, Self::Created | Self::Exited)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub status: ContainerStatus,
}

#[async_trait]
pub trait ContainerPlatform: Send + Sync {
    /// Look the container up by name. Absent containers are `NotFound`.
    async fn get(&self, name: &str) -> Result<ContainerInfo, PlatformError>;

    /// Create and start a container from `spec`.
    async fn run(&self, spec: &WorkerSpec) -> Result<ContainerInfo, PlatformError>;

    async fn start(&self, name: &str) -> Result<(), PlatformError>;

    async fn stop(&self, name: &str) -> Result<(), PlatformError>;

    /// Force-remove the container, running or not.
    async fn remove(&self, name: &str) -> Result<(), PlatformError>;
}
