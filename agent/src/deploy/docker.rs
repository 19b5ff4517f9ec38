//! Container, image and network lifecycle through the Docker engine API

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::{BuildImageOptions, RemoveImageOptions};
use bollard::network::ListNetworksOptions;
use bollard::service::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::deploy::paths::clean;
use crate::deploy::resources::{ResourceNames, PROJECT_LABEL};
use crate::errors::DeployError;

/// Grace period used when tearing containers down for removal
const REMOVE_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Project-scoped container engine operations.
///
/// Every lookup is filtered by the project label, so other projects'
/// resources are never touched.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build the project image from `context_dir`
    async fn build_image(
        &self,
        project_id: &str,
        context_dir: &Path,
        dockerfile_path: &str,
    ) -> Result<(), DeployError>;

    /// Replace the project container with a fresh one bound to `127.0.0.1:host_port`
    async fn run_container(
        &self,
        project_id: &str,
        host_port: u16,
        container_port: u16,
    ) -> Result<(), DeployError>;

    async fn start_containers(&self, project_id: &str) -> Result<usize, DeployError>;

    async fn stop_containers(&self, project_id: &str, timeout: Duration) -> Result<usize, DeployError>;

    async fn pause_containers(&self, project_id: &str) -> Result<usize, DeployError>;

    async fn unpause_containers(&self, project_id: &str) -> Result<usize, DeployError>;

    /// Stop then force-remove every labelled container
    async fn remove_containers(&self, project_id: &str) -> Result<usize, DeployError>;

    /// Remove networks whose name starts with the project prefix
    async fn remove_networks(&self, project_id: &str) -> Result<usize, DeployError>;

    async fn remove_image(&self, project_id: &str) -> Result<(), DeployError>;
}

/// Docker daemon client
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using the local defaults (`DOCKER_HOST` or the unix socket)
    pub fn connect() -> Result<Self, DeployError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    async fn project_containers(&self, project_id: &str) -> Result<Vec<String>, DeployError> {
        if project_id.is_empty() {
            return Err(DeployError::validation("project id is required"));
        }
        let names = ResourceNames::for_project(project_id);
        let filters = HashMap::from([("label".to_string(), vec![names.label_filter()])]);
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn build_image(
        &self,
        project_id: &str,
        context_dir: &Path,
        dockerfile_path: &str,
    ) -> Result<(), DeployError> {
        if project_id.is_empty() {
            return Err(DeployError::validation("project id is required"));
        }
        if context_dir.as_os_str().is_empty() {
            return Err(DeployError::validation("context dir is required"));
        }
        let dockerfile = dockerfile_in_context(dockerfile_path);
        let names = ResourceNames::for_project(project_id);

        let context = tar_directory(context_dir.to_path_buf()).await?;
        info!(
            project_id = %project_id,
            "Building {} from {} ({} bytes of context)",
            names.image,
            context_dir.display(),
            context.len()
        );

        let options = BuildImageOptions {
            t: names.image.clone(),
            dockerfile,
            rm: true,
            ..Default::default()
        };
        let mut stream = self.docker.build_image(options, None, Some(context));
        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| DeployError::Build(e.to_string()))?;
            if let Some(message) = event.error_detail.and_then(|d| d.message) {
                return Err(DeployError::Build(message));
            }
            if let Some(message) = event.error {
                return Err(DeployError::Build(message));
            }
            if let Some(line) = event.stream {
                let line = line.trim();
                if !line.is_empty() {
                    debug!(project_id = %project_id, "build: {}", line);
                }
            }
        }
        Ok(())
    }

    async fn run_container(
        &self,
        project_id: &str,
        host_port: u16,
        container_port: u16,
    ) -> Result<(), DeployError> {
        if project_id.is_empty() {
            return Err(DeployError::validation("project id is required"));
        }
        if host_port == 0 {
            return Err(DeployError::validation("invalid host_port: 0"));
        }
        if container_port == 0 {
            return Err(DeployError::validation("invalid container_port: 0"));
        }

        let names = ResourceNames::for_project(project_id);
        let exposed = format!("{container_port}/tcp");

        // idempotent replace
        if let Err(e) = self
            .docker
            .remove_container(
                &names.container,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            debug!("No previous container {} removed: {}", names.container, e);
        }

        let config = Config {
            image: Some(names.image.clone()),
            labels: Some(HashMap::from([(
                PROJECT_LABEL.to_string(),
                project_id.to_string(),
            )])),
            exposed_ports: Some(HashMap::from([(exposed.clone(), HashMap::new())])),
            host_config: Some(HostConfig {
                port_bindings: Some(HashMap::from([(
                    exposed,
                    Some(vec![PortBinding {
                        host_ip: Some("127.0.0.1".to_string()),
                        host_port: Some(host_port.to_string()),
                    }]),
                )])),
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    maximum_retry_count: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: names.container.clone(),
                    platform: None,
                }),
                config,
            )
            .await?;
        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await?;

        info!(
            project_id = %project_id,
            "Started {} on 127.0.0.1:{} -> {}/tcp",
            names.container,
            host_port,
            container_port
        );
        Ok(())
    }

    async fn start_containers(&self, project_id: &str) -> Result<usize, DeployError> {
        let ids = self.project_containers(project_id).await?;
        for id in &ids {
            self.docker
                .start_container(id, None::<StartContainerOptions<String>>)
                .await?;
        }
        Ok(ids.len())
    }

    async fn stop_containers(&self, project_id: &str, timeout: Duration) -> Result<usize, DeployError> {
        let ids = self.project_containers(project_id).await?;
        for id in &ids {
            self.docker
                .stop_container(id, Some(stop_options(timeout)))
                .await?;
        }
        Ok(ids.len())
    }

    async fn pause_containers(&self, project_id: &str) -> Result<usize, DeployError> {
        let ids = self.project_containers(project_id).await?;
        for id in &ids {
            self.docker.pause_container(id).await?;
        }
        Ok(ids.len())
    }

    async fn unpause_containers(&self, project_id: &str) -> Result<usize, DeployError> {
        let ids = self.project_containers(project_id).await?;
        for id in &ids {
            self.docker.unpause_container(id).await?;
        }
        Ok(ids.len())
    }

    async fn remove_containers(&self, project_id: &str) -> Result<usize, DeployError> {
        let ids = self.project_containers(project_id).await?;
        for id in &ids {
            if let Err(e) = self
                .docker
                .stop_container(id, Some(stop_options(REMOVE_STOP_TIMEOUT)))
                .await
            {
                debug!("Stop before removal of {} failed: {}", id, e);
            }
            self.docker
                .remove_container(
                    id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await?;
        }
        Ok(ids.len())
    }

    async fn remove_networks(&self, project_id: &str) -> Result<usize, DeployError> {
        if project_id.is_empty() {
            return Err(DeployError::validation("project id is required"));
        }
        let prefix = ResourceNames::for_project(project_id).network_prefix;
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await?;

        let mut removed = 0;
        for network in networks {
            let Some(name) = network.name else {
                continue;
            };
            if !name.starts_with(&prefix) {
                continue;
            }
            let target = network.id.unwrap_or_else(|| name.clone());
            match self.docker.remove_network(&target).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(project_id = %project_id, "Failed to remove network {}: {}", name, e),
            }
        }
        Ok(removed)
    }

    async fn remove_image(&self, project_id: &str) -> Result<(), DeployError> {
        let names = ResourceNames::for_project(project_id);
        self.docker
            .remove_image(
                &names.image,
                Some(RemoveImageOptions {
                    force: true,
                    noprune: false,
                }),
                None,
            )
            .await?;
        Ok(())
    }
}

fn stop_options(timeout: Duration) -> StopContainerOptions {
    StopContainerOptions {
        t: i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX),
    }
}

/// Dockerfile location relative to the build context, `/`-separated
pub fn dockerfile_in_context(dockerfile_path: &str) -> String {
    let path = dockerfile_path.trim();
    if path.is_empty() {
        return "Dockerfile".to_string();
    }
    let path = Path::new(path);
    if path.is_absolute() {
        return path.display().to_string();
    }
    clean(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Archive `dir` as a build context on a blocking thread
async fn tar_directory(dir: PathBuf) -> Result<Bytes, DeployError> {
    tokio::task::spawn_blocking(move || -> Result<Bytes, DeployError> {
        let mut builder = tar::Builder::new(Vec::new());
        builder.follow_symlinks(false);
        builder.append_dir_all(".", &dir)?;
        let data = builder.into_inner()?;
        Ok(Bytes::from(data))
    })
    .await?
}
