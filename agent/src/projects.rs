//! Project creation, configuration and job submission

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::deploy::compose::{parse_services, validate_services, DEFAULT_COMPOSE_FILE};
use crate::deploy::git::remove_working_copy;
use crate::deploy::ports::{compose_port, dockerfile_port};
use crate::errors::DeployError;
use crate::models::{
    DeployType, Detection, DraftType, Job, JobType, Project, ProjectDraft, ProjectStatus,
};
use crate::store::Store;
use crate::utils::{new_id, now_unix};
use crate::workers::queue::JobQueue;

const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// Explicitly configured project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewProject {
    pub name: String,
    pub git_url: String,
    pub git_ref: String,
    pub repo_subdir: String,
    pub deploy_type: String,
    pub compose_file: String,
    pub compose_service: String,
    pub dockerfile_path: String,
    pub host_port: i64,
    pub container_port: i64,
    /// Submit a deploy job right away
    pub deploy: bool,
}

/// Detector result for a fresh clone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectedDraft {
    pub name: String,
    pub git_url: String,
    #[serde(flatten)]
    pub detection: Detection,
    pub repo_dir: String,
}

/// Choices made on top of a draft; empty fields fall back to what was detected
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftSelection {
    pub draft_id: String,
    pub dockerfile_content: String,
    pub compose_content: String,
    pub compose_service: String,
    pub git_ref: String,
    pub repo_subdir: String,
    pub deploy: bool,
}

/// A persisted project and the job submitted with it, if any
#[derive(Debug, Clone, Serialize)]
pub struct Created {
    pub project: Project,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
}

/// Front door for anything that creates projects or requests operations
pub struct ProjectService {
    store: Arc<dyn Store>,
    queue: JobQueue,
    draft_ttl: Duration,
}

impl ProjectService {
    pub fn new(store: Arc<dyn Store>, queue: JobQueue, draft_ttl: Duration) -> Self {
        Self {
            store,
            queue,
            draft_ttl,
        }
    }

    pub async fn create_project(&self, req: NewProject) -> Result<Created, DeployError> {
        let name = required(&req.name, "name")?;
        let git_url = required(&req.git_url, "git_url")?;
        let host_port = port(req.host_port, "host_port")?;
        let container_port = port(req.container_port, "container_port")?;
        let deploy_type: DeployType = req.deploy_type.parse()?;

        let compose_service = req.compose_service.trim().to_string();
        validate_services(&parse_services(&compose_service))?;

        let now = now_unix();
        let project = self
            .store
            .create_project(Project {
                id: new_id(),
                name,
                git_url,
                git_ref: req.git_ref,
                repo_subdir: req.repo_subdir,
                deploy_type,
                compose_file: req.compose_file,
                compose_service,
                dockerfile_path: req.dockerfile_path,
                dockerfile_content: String::new(),
                compose_content: String::new(),
                host_port,
                container_port,
                last_status: ProjectStatus::Unknown,
                last_status_at: None,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;
        info!(project_id = %project.id, "Created project {}", project.name);

        self.created(project, req.deploy).await
    }

    /// Persist a detector result that expires after the configured TTL
    pub async fn register_draft(&self, detected: DetectedDraft) -> Result<ProjectDraft, DeployError> {
        let name = required(&detected.name, "name")?;
        let git_url = required(&detected.git_url, "git_url")?;
        let now = now_unix();
        let ttl = i64::try_from(self.draft_ttl.as_secs()).unwrap_or(i64::MAX);

        self.store
            .create_draft(ProjectDraft {
                id: new_id(),
                name,
                git_url,
                detection: detected.detection,
                repo_dir: detected.repo_dir,
                created_at: now,
                expires_at: now.saturating_add(ttl),
            })
            .await
    }

    pub async fn create_from_draft(&self, req: DraftSelection) -> Result<Created, DeployError> {
        let draft_id = required(&req.draft_id, "draft_id")?;
        let draft = self.store.get_draft(&draft_id).await?;
        let detected = &draft.detection;

        let mut dockerfile_content = req.dockerfile_content.trim().to_string();
        if dockerfile_content.is_empty() {
            dockerfile_content = detected.dockerfile_content.clone();
        }
        let mut compose_content = req.compose_content.trim().to_string();
        // with nothing detected the caller's own text decides the type
        if compose_content.is_empty() && detected.deploy_type != DraftType::None {
            compose_content = detected.compose_content.clone();
        }

        let deploy_type = match detected.deploy_type {
            DraftType::Compose => DeployType::Compose,
            DraftType::Dockerfile => DeployType::Dockerfile,
            DraftType::None if !compose_content.is_empty() => DeployType::Compose,
            DraftType::None => DeployType::Dockerfile,
        };

        let (compose_file, compose_service, dockerfile_path, ports) = match deploy_type {
            DeployType::Compose => {
                let compose_file = or_default(&detected.compose_path, DEFAULT_COMPOSE_FILE);
                let mut service = req.compose_service.trim().to_string();
                if service.is_empty() {
                    service = detected.services.first().cloned().unwrap_or_default();
                }
                validate_services(&parse_services(&service))?;
                let ports = compose_port(&compose_content, &service);
                (compose_file, service, String::new(), ports)
            }
            _ => {
                let dockerfile_path = or_default(&detected.dockerfile_path, DEFAULT_DOCKERFILE);
                let container_port = dockerfile_port(&dockerfile_content);
                (String::new(), String::new(), dockerfile_path, (container_port, container_port))
            }
        };

        let (host_port, container_port) = ports;
        if host_port == 0 || container_port == 0 {
            return Err(DeployError::validation(
                "unable to find a port: check the Dockerfile EXPOSE directive or the compose ports",
            ));
        }

        let now = now_unix();
        let project = self
            .store
            .create_project(Project {
                id: new_id(),
                name: draft.name.clone(),
                git_url: draft.git_url.clone(),
                git_ref: req.git_ref,
                repo_subdir: req.repo_subdir,
                deploy_type,
                compose_file,
                compose_service,
                dockerfile_path,
                dockerfile_content,
                compose_content,
                host_port,
                container_port,
                last_status: ProjectStatus::Unknown,
                last_status_at: None,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;
        info!(project_id = %project.id, draft_id = %draft.id, "Created project {} from draft", project.name);

        if !draft.repo_dir.is_empty() {
            if let Err(e) = remove_working_copy(PathBuf::from(&draft.repo_dir)).await {
                warn!("Failed to remove draft clone {}: {}", draft.repo_dir, e);
            }
        }
        if let Err(e) = self.store.delete_draft(&draft.id).await {
            warn!(draft_id = %draft.id, "Failed to delete draft: {}", e);
        }

        self.created(project, req.deploy).await
    }

    /// Replace the literal config text; ports follow when they can be parsed from it
    pub async fn update_config(
        &self,
        project_id: &str,
        dockerfile_content: &str,
        compose_content: &str,
    ) -> Result<(), DeployError> {
        let project = self.store.get_project(project_id).await?;

        let ports = if project.deploy_type == DeployType::Compose && !compose_content.is_empty() {
            compose_port(compose_content, &project.compose_service)
        } else if !dockerfile_content.is_empty() {
            let container_port = dockerfile_port(dockerfile_content);
            (container_port, container_port)
        } else {
            (0, 0)
        };
        let ports = (ports.0 > 0 && ports.1 > 0).then_some(ports);

        self.store
            .update_project_config(project_id, dockerfile_content, compose_content, ports)
            .await
    }

    /// Persist a queued job for an existing project and hand it to the worker
    pub async fn submit(&self, project_id: &str, job_type: JobType) -> Result<Job, DeployError> {
        self.store.get_project(project_id).await?;

        let job = self
            .store
            .create_job(Job::queued(new_id(), project_id, job_type, now_unix()))
            .await?;
        self.queue.enqueue(&job.id).await?;
        info!(job_id = %job.id, project_id = %project_id, "Submitted {} job", job_type);
        Ok(job)
    }

    async fn created(&self, project: Project, deploy: bool) -> Result<Created, DeployError> {
        let job = if deploy {
            Some(self.submit(&project.id, JobType::Deploy).await?)
        } else {
            None
        };
        Ok(Created { project, job })
    }
}

fn required(value: &str, field: &str) -> Result<String, DeployError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DeployError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn port(value: i64, field: &str) -> Result<u16, DeployError> {
    match u16::try_from(value) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(DeployError::validation(format!("invalid {field}"))),
    }
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}
