use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerStateStatusEnum, HostConfig, PortBinding};
use futures_util::StreamExt;
use manager_core::WorkerSpec;

use crate::{ContainerInfo, ContainerPlatform, ContainerStatus, PlatformError};

/// [`ContainerPlatform`] backed by the local Docker daemon.
pub struct DockerPlatform {
    docker: Docker,
    stop_grace: Duration,
    pull_missing_image: bool,
}

impl DockerPlatform {
    /// Connect using `DOCKER_HOST` or the platform's default socket.
    pub fn connect(stop_grace: Duration, pull_missing_image: bool) -> Result<Self, PlatformError> {
        let docker = Docker::connect_with_local_defaults().map_err(map_error)?;
        Ok(Self {
            docker,
            stop_grace,
            pull_missing_image,
        })
    }

    async fn create(&self, spec: &WorkerSpec) -> Result<String, PlatformError> {
        let port_key = spec.container_port_key();
        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key.clone(), HashMap::new());

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key,
            Some(vec![PortBinding {
                host_ip: Some(spec.bind_address.clone()),
                host_port: Some(spec.host_port.to_string()),
            }]),
        );

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            memory: Some(spec.memory_limit_bytes()),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(map_error)?;
        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, warning = %warning, "docker create warning");
        }
        Ok(response.id)
    }

    async fn pull(&self, image: &str) -> Result<(), PlatformError> {
        let (from_image, tag) = split_image_tag(image);
        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };
        let mut stream = std::pin::pin!(self.docker.create_image(Some(options), None, None));
        while let Some(progress) = stream.next().await {
            let info = progress.map_err(map_error)?;
            if let Some(status) = info.status {
                tracing::debug!(image = %image, status = %status, "pull progress");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerPlatform for DockerPlatform {
    async fn get(&self, name: &str) -> Result<ContainerInfo, PlatformError> {
        let inspect = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(map_error)?;
        let status = inspect
            .state
            .and_then(|state| state.status)
            .map(map_status)
            .unwrap_or(ContainerStatus::Unknown);
        Ok(ContainerInfo {
            id: inspect.id.unwrap_or_default(),
            name: name.to_string(),
            status,
        })
    }

    async fn run(&self, spec: &WorkerSpec) -> Result<ContainerInfo, PlatformError> {
        let id = match self.create(spec).await {
            Ok(id) => id,
            // 404 on create means the image is not present locally.
            Err(PlatformError::NotFound(reason)) if self.pull_missing_image => {
                tracing::info!(
                    image = %spec.image,
                    reason = %reason,
                    "image missing locally, pulling"
                );
                self.pull(&spec.image).await?;
                self.create(spec).await?
            }
            Err(err) => return Err(err),
        };

        self.docker
            .start_container(&id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_error)?;

        Ok(ContainerInfo {
            id,
            name: spec.name.clone(),
            status: ContainerStatus::Running,
        })
    }

    async fn start(&self, name: &str) -> Result<(), PlatformError> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_error)
    }

    async fn stop(&self, name: &str) -> Result<(), PlatformError> {
        let grace = self.stop_grace.as_secs().min(i64::MAX as u64) as i64;
        self.docker
            .stop_container(name, Some(StopContainerOptions { t: grace }))
            .await
            .map_err(map_error)
    }

    async fn remove(&self, name: &str) -> Result<(), PlatformError> {
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(map_error)
    }
}

fn map_error(err: bollard::errors::Error) -> PlatformError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => match status_code {
            404 => PlatformError::NotFound(message),
            409 => PlatformError::Conflict(message),
            304 => PlatformError::NotModified(message),
            _ => PlatformError::Api(format!("{} ({})", message, status_code)),
        },
        other => PlatformError::Api(other.to_string()),
    }
}

fn map_status(status: ContainerStateStatusEnum) -> ContainerStatus {
    match status {
        ContainerStateStatusEnum::CREATED => ContainerStatus::Created,
        ContainerStateStatusEnum::RUNNING => ContainerStatus::Running,
        ContainerStateStatusEnum::RESTARTING => ContainerStatus::Restarting,
        ContainerStateStatusEnum::PAUSED => ContainerStatus::Paused,
        ContainerStateStatusEnum::REMOVING => ContainerStatus::Removing,
        ContainerStateStatusEnum::EXITED => ContainerStatus::Exited,
        ContainerStateStatusEnum::DEAD => ContainerStatus::Dead,
        ContainerStateStatusEnum::EMPTY => ContainerStatus::Unknown,
    }
}

/// Split `repo[:tag]`, ignoring a registry port such as `host:5000/repo`.
fn split_image_tag(image: &str) -> (&str, &str) {
    let name_start = image.rfind('/').map(|idx| idx + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(idx) => {
            let split = name_start + idx;
            (&image[..split], &image[split + 1..])
        }
        None => (image, "latest"),
    }
}
