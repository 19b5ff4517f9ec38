//! Record store boundary

pub mod json;

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::models::{Job, JobStatus, Project, ProjectDraft, ProjectStatus};

pub use json::JsonStore;

/// Persistence of projects, jobs and drafts.
///
/// Implementations serialize concurrent access themselves.
#[async_trait]
pub trait Store: Send + Sync {
    // ----------------------------- projects ----------------------------- //

    /// Persist a new project; fails with `Conflict` if an active project
    /// already claims its host port
    async fn create_project(&self, project: Project) -> Result<Project, DeployError>;

    /// Active (non-deleted) project by id
    async fn get_project(&self, id: &str) -> Result<Project, DeployError>;

    /// Active projects, newest first
    async fn list_projects(&self) -> Result<Vec<Project>, DeployError>;

    /// Replace the literal Dockerfile/compose text, and the ports when given
    async fn update_project_config(
        &self,
        id: &str,
        dockerfile_content: &str,
        compose_content: &str,
        ports: Option<(u16, u16)>,
    ) -> Result<(), DeployError>;

    async fn set_project_status(&self, id: &str, status: ProjectStatus) -> Result<(), DeployError>;

    /// Soft delete: status `deleted` and `deleted_at` set
    async fn mark_project_deleted(&self, id: &str) -> Result<(), DeployError>;

    // ------------------------------- jobs ------------------------------- //

    async fn create_job(&self, job: Job) -> Result<Job, DeployError>;

    async fn get_job(&self, id: &str) -> Result<Job, DeployError>;

    /// Jobs in `status`, oldest request first
    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>, DeployError>;

    async fn latest_job_for_project(&self, project_id: &str) -> Result<Job, DeployError>;

    async fn set_job_running(&self, id: &str, step: &str) -> Result<(), DeployError>;

    async fn set_job_step(&self, id: &str, step: &str) -> Result<(), DeployError>;

    /// Append one line to the job log; the newline is added here
    async fn append_job_log(&self, id: &str, line: &str) -> Result<(), DeployError>;

    async fn set_job_succeeded(&self, id: &str) -> Result<(), DeployError>;

    async fn set_job_failed(&self, id: &str, message: &str) -> Result<(), DeployError>;

    // ------------------------------ drafts ------------------------------ //

    async fn create_draft(&self, draft: ProjectDraft) -> Result<ProjectDraft, DeployError>;

    async fn get_draft(&self, id: &str) -> Result<ProjectDraft, DeployError>;

    async fn delete_draft(&self, id: &str) -> Result<(), DeployError>;

    /// Drafts whose expiry is at or before `now`
    async fn list_expired_drafts(&self, now: i64) -> Result<Vec<ProjectDraft>, DeployError>;
}
