//! Record store backed by a single JSON document

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::deploy::fsm::JobEvent;
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::project::normalize_compose_file;
use crate::models::{Job, JobStatus, Project, ProjectDraft, ProjectStatus};
use crate::store::Store;
use crate::utils::now_unix;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Records {
    #[serde(default)]
    projects: BTreeMap<String, Project>,

    /// Insertion order breaks `requested_at` ties
    #[serde(default)]
    jobs: Vec<Job>,

    #[serde(default)]
    drafts: BTreeMap<String, ProjectDraft>,
}

impl Records {
    fn active_project_mut(&mut self, id: &str) -> Result<&mut Project, DeployError> {
        self.projects
            .get_mut(id)
            .filter(|p| !p.is_deleted())
            .ok_or_else(|| DeployError::NotFound(format!("project {id}")))
    }

    fn job_mut(&mut self, id: &str) -> Result<&mut Job, DeployError> {
        self.jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| DeployError::NotFound(format!("job {id}")))
    }

    fn check_host_port(&self, host_port: u16, except: Option<&str>) -> Result<(), DeployError> {
        if host_port == 0 {
            return Ok(());
        }
        let claimed = self.projects.values().find(|p| {
            !p.is_deleted() && p.host_port == host_port && Some(p.id.as_str()) != except
        });
        match claimed {
            Some(p) => Err(DeployError::Conflict(format!(
                "host_port {host_port} already used by project {}",
                p.id
            ))),
            None => Ok(()),
        }
    }

    /// Strip repository prefixes accidentally stored in compose paths
    fn repair_compose_paths(&mut self) -> usize {
        let mut repaired = 0;
        for project in self.projects.values_mut() {
            if project.compose_file.is_empty() {
                continue;
            }
            let fixed = normalize_compose_file(&project.compose_file, &project.id);
            if fixed != project.compose_file {
                debug!(
                    project_id = %project.id,
                    "repairing compose_file {:?} -> {:?}", project.compose_file, fixed
                );
                project.compose_file = fixed;
                repaired += 1;
            }
        }
        repaired
    }
}

/// JSON-file record store.
///
/// Every mutation rewrites the document atomically while holding the lock.
/// A failed write leaves the in-memory records untouched.
pub struct JsonStore {
    file: Option<File>,
    records: Mutex<Records>,
}

impl JsonStore {
    /// Open (or create) the store document
    pub async fn open(file: File) -> Result<Self, DeployError> {
        let mut records = if file.exists().await {
            file.read_json::<Records>().await.map_err(|e| {
                DeployError::Store(format!("read {}: {}", file.path().display(), e))
            })?
        } else {
            Records::default()
        };

        let repaired = records.repair_compose_paths();
        if repaired > 0 {
            info!("Repaired {} stored compose file path(s)", repaired);
            file.write_json(&records).await?;
        }

        info!(
            "Opened record store at {} ({} projects, {} jobs)",
            file.path().display(),
            records.projects.len(),
            records.jobs.len()
        );
        Ok(Self {
            file: Some(file),
            records: Mutex::new(records),
        })
    }

    /// In-memory store that never touches disk
    pub fn ephemeral() -> Self {
        Self {
            file: None,
            records: Mutex::new(Records::default()),
        }
    }

    /// Project by id, soft-deleted ones included
    pub async fn project_record(&self, id: &str) -> Option<Project> {
        self.records.lock().await.projects.get(id).cloned()
    }

    async fn read<T>(&self, f: impl FnOnce(&Records) -> Result<T, DeployError>) -> Result<T, DeployError> {
        let records = self.records.lock().await;
        f(&records)
    }

    /// Apply `f` to a staged copy; it replaces the live records only once
    /// persisted
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Records) -> Result<T, DeployError>,
    ) -> Result<T, DeployError> {
        let mut records = self.records.lock().await;
        let mut staged = records.clone();
        let value = f(&mut staged)?;
        if let Some(file) = &self.file {
            file.write_json(&staged).await?;
        }
        *records = staged;
        Ok(value)
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn create_project(&self, mut project: Project) -> Result<Project, DeployError> {
        if project.id.is_empty() {
            return Err(DeployError::validation("project id is required"));
        }
        let now = now_unix();
        if project.created_at == 0 {
            project.created_at = now;
        }
        if project.updated_at == 0 {
            project.updated_at = now;
        }
        if project.dockerfile_path.is_empty() {
            project.dockerfile_path = "Dockerfile".to_string();
        }
        project.deleted_at = None;

        self.mutate(|records| {
            if records.projects.contains_key(&project.id) {
                return Err(DeployError::Conflict(format!("project {} exists", project.id)));
            }
            records.check_host_port(project.host_port, None)?;
            records.projects.insert(project.id.clone(), project.clone());
            Ok(project)
        })
        .await
    }

    async fn get_project(&self, id: &str) -> Result<Project, DeployError> {
        self.read(|records| {
            records
                .projects
                .get(id)
                .filter(|p| !p.is_deleted())
                .cloned()
                .ok_or_else(|| DeployError::NotFound(format!("project {id}")))
        })
        .await
    }

    async fn list_projects(&self) -> Result<Vec<Project>, DeployError> {
        self.read(|records| {
            let mut projects: Vec<Project> = records
                .projects
                .values()
                .filter(|p| !p.is_deleted())
                .cloned()
                .collect();
            projects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
            Ok(projects)
        })
        .await
    }

    async fn update_project_config(
        &self,
        id: &str,
        dockerfile_content: &str,
        compose_content: &str,
        ports: Option<(u16, u16)>,
    ) -> Result<(), DeployError> {
        self.mutate(|records| {
            if let Some((host_port, _)) = ports {
                records.check_host_port(host_port, Some(id))?;
            }
            let project = records.active_project_mut(id)?;
            project.dockerfile_content = dockerfile_content.to_string();
            project.compose_content = compose_content.to_string();
            if let Some((host_port, container_port)) = ports {
                project.host_port = host_port;
                project.container_port = container_port;
            }
            project.updated_at = now_unix();
            Ok(())
        })
        .await
    }

    async fn set_project_status(&self, id: &str, status: ProjectStatus) -> Result<(), DeployError> {
        self.mutate(|records| {
            let project = records.active_project_mut(id)?;
            let now = now_unix();
            project.last_status = status;
            project.last_status_at = Some(now);
            project.updated_at = now;
            Ok(())
        })
        .await
    }

    async fn mark_project_deleted(&self, id: &str) -> Result<(), DeployError> {
        self.mutate(|records| {
            let project = records.active_project_mut(id)?;
            let now = now_unix();
            project.last_status = ProjectStatus::Deleted;
            project.last_status_at = Some(now);
            project.deleted_at = Some(now);
            project.updated_at = now;
            Ok(())
        })
        .await
    }

    async fn create_job(&self, mut job: Job) -> Result<Job, DeployError> {
        if job.id.is_empty() {
            return Err(DeployError::validation("job id is required"));
        }
        if job.requested_at == 0 {
            job.requested_at = now_unix();
        }
        self.mutate(|records| {
            if records.jobs.iter().any(|j| j.id == job.id) {
                return Err(DeployError::Conflict(format!("job {} exists", job.id)));
            }
            records.jobs.push(job.clone());
            Ok(job)
        })
        .await
    }

    async fn get_job(&self, id: &str) -> Result<Job, DeployError> {
        self.read(|records| {
            records
                .jobs
                .iter()
                .find(|j| j.id == id)
                .cloned()
                .ok_or_else(|| DeployError::NotFound(format!("job {id}")))
        })
        .await
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>, DeployError> {
        self.read(|records| {
            let mut jobs: Vec<Job> = records
                .jobs
                .iter()
                .filter(|j| j.status == status)
                .cloned()
                .collect();
            // stable: equal timestamps keep insertion order
            jobs.sort_by_key(|j| j.requested_at);
            Ok(jobs)
        })
        .await
    }

    async fn latest_job_for_project(&self, project_id: &str) -> Result<Job, DeployError> {
        self.read(|records| {
            records
                .jobs
                .iter()
                .filter(|j| j.project_id == project_id)
                .max_by_key(|j| j.requested_at)
                .cloned()
                .ok_or_else(|| DeployError::NotFound(format!("job for project {project_id}")))
        })
        .await
    }

    async fn set_job_running(&self, id: &str, step: &str) -> Result<(), DeployError> {
        self.mutate(|records| {
            let job = records.job_mut(id)?;
            job.status = job.status.apply(&JobEvent::Start)?;
            job.current_step = step.to_string();
            job.started_at = Some(now_unix());
            Ok(())
        })
        .await
    }

    async fn set_job_step(&self, id: &str, step: &str) -> Result<(), DeployError> {
        self.mutate(|records| {
            let job = records.job_mut(id)?;
            job.current_step = step.to_string();
            Ok(())
        })
        .await
    }

    async fn append_job_log(&self, id: &str, line: &str) -> Result<(), DeployError> {
        self.mutate(|records| {
            let job = records.job_mut(id)?;
            job.log.push_str(line);
            job.log.push('\n');
            Ok(())
        })
        .await
    }

    async fn set_job_succeeded(&self, id: &str) -> Result<(), DeployError> {
        self.mutate(|records| {
            let job = records.job_mut(id)?;
            job.status = job.status.apply(&JobEvent::Succeed)?;
            job.finished_at = Some(now_unix());
            Ok(())
        })
        .await
    }

    async fn set_job_failed(&self, id: &str, message: &str) -> Result<(), DeployError> {
        self.mutate(|records| {
            let job = records.job_mut(id)?;
            job.status = job.status.apply(&JobEvent::Fail(message.to_string()))?;
            job.error = message.to_string();
            job.finished_at = Some(now_unix());
            Ok(())
        })
        .await
    }

    async fn create_draft(&self, mut draft: ProjectDraft) -> Result<ProjectDraft, DeployError> {
        let required = [
            ("id", draft.id.is_empty()),
            ("name", draft.name.is_empty()),
            ("git_url", draft.git_url.is_empty()),
            ("repo_dir", draft.repo_dir.is_empty()),
            ("expires_at", draft.expires_at == 0),
        ];
        if let Some((field, _)) = required.iter().find(|(_, missing)| *missing) {
            return Err(DeployError::validation(format!("draft {field} is required")));
        }
        if draft.created_at == 0 {
            draft.created_at = now_unix();
        }
        self.mutate(|records| {
            records.drafts.insert(draft.id.clone(), draft.clone());
            Ok(draft)
        })
        .await
    }

    async fn get_draft(&self, id: &str) -> Result<ProjectDraft, DeployError> {
        self.read(|records| {
            records
                .drafts
                .get(id)
                .cloned()
                .ok_or_else(|| DeployError::NotFound(format!("draft {id}")))
        })
        .await
    }

    async fn delete_draft(&self, id: &str) -> Result<(), DeployError> {
        self.mutate(|records| {
            records.drafts.remove(id);
            Ok(())
        })
        .await
    }

    async fn list_expired_drafts(&self, now: i64) -> Result<Vec<ProjectDraft>, DeployError> {
        self.read(|records| {
            Ok(records
                .drafts
                .values()
                .filter(|d| d.is_expired(now))
                .cloned()
                .collect())
        })
        .await
    }
}
