//! Startup recovery of persisted jobs

use tracing::{info, warn};

use crate::errors::DeployError;
use crate::models::JobStatus;
use crate::store::Store;
use crate::utils::now_rfc3339;
use crate::workers::queue::JobQueue;

pub const INTERRUPTED_ERROR: &str = "interrupted by agent restart";

/// Fail every job a previous process left `running`; they are never resumed
pub async fn fail_interrupted(store: &dyn Store) -> Result<usize, DeployError> {
    let running = store.list_jobs_by_status(JobStatus::Running).await?;
    for job in &running {
        warn!(job_id = %job.id, project_id = %job.project_id, "Failing job interrupted by restart");
        store
            .append_job_log(&job.id, &format!("{} error: {}", now_rfc3339(), INTERRUPTED_ERROR))
            .await?;
        store.set_job_failed(&job.id, INTERRUPTED_ERROR).await?;
    }
    Ok(running.len())
}

/// Re-enqueue every `queued` job, oldest request first
pub async fn recover_persisted(store: &dyn Store, queue: &JobQueue) -> Result<usize, DeployError> {
    let queued = store.list_jobs_by_status(JobStatus::Queued).await?;
    for job in &queued {
        queue.enqueue(&job.id).await?;
    }
    if !queued.is_empty() {
        info!("Recovered {} queued job(s)", queued.len());
    }
    Ok(queued.len())
}
