//! Deployment worker: drives queued jobs to a terminal state, one at a time

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::deploy::cleanup::{CleanupKind, CleanupReport};
use crate::deploy::compose::{Compose, ComposeCommand, ComposeSpec, DEFAULT_COMPOSE_FILE};
use crate::deploy::docker::ContainerEngine;
use crate::deploy::git::{remove_working_copy, SourceSync, SyncOutcome};
use crate::deploy::paths::{host_work_dir, safe_join, work_dir};
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::{EffectiveDeployType, Job, JobStatus, JobType, Project, ProjectStatus};
use crate::storage::layout::{HostLayout, StorageLayout};
use crate::store::Store;
use crate::utils::now_rfc3339;
use crate::workers::queue::JobReceiver;

const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// Deployer worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Grace period for stopping dockerfile containers
    pub stop_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(10),
        }
    }
}

/// Container-level operation for dockerfile projects
#[derive(Debug, Clone, Copy)]
enum ContainerOp {
    Start,
    Stop,
    Pause,
    Unpause,
}

impl ContainerOp {
    fn step(&self) -> &'static str {
        match self {
            ContainerOp::Start => "docker_start",
            ContainerOp::Stop => "docker_stop",
            ContainerOp::Pause => "docker_pause",
            ContainerOp::Unpause => "docker_unpause",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            ContainerOp::Start => "started",
            ContainerOp::Stop => "stopped",
            ContainerOp::Pause => "paused",
            ContainerOp::Unpause => "unpaused",
        }
    }
}

/// Single consumer of the job queue
pub struct Deployer {
    store: Arc<dyn Store>,
    engine: Arc<dyn ContainerEngine>,
    compose: Compose,
    source: Arc<dyn SourceSync>,
    layout: StorageLayout,
    host_layout: Option<HostLayout>,
    options: Options,
}

impl Deployer {
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<dyn ContainerEngine>,
        compose: Compose,
        source: Arc<dyn SourceSync>,
        layout: StorageLayout,
        host_layout: Option<HostLayout>,
        options: Options,
    ) -> Self {
        Self {
            store,
            engine,
            compose,
            source,
            layout,
            host_layout,
            options,
        }
    }

    /// Process jobs until shutdown or until every producer is dropped.
    ///
    /// Shutdown is only observed between jobs.
    pub async fn run(
        &self,
        mut receiver: JobReceiver,
        mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
    ) {
        info!("Deployer worker starting...");

        loop {
            let job_id = tokio::select! {
                biased;
                _ = &mut shutdown_signal => {
                    info!("Deployer worker shutting down...");
                    return;
                }
                next = receiver.recv() => match next {
                    Some(id) => id,
                    None => {
                        info!("Job queue closed, deployer worker exiting...");
                        return;
                    }
                },
            };
            self.process(&job_id).await;
        }
    }

    /// Run one job if it is still queued
    pub async fn process(&self, job_id: &str) {
        let job = match self.store.get_job(job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, "Unable to load job: {}", e);
                return;
            }
        };
        if job.status != JobStatus::Queued {
            debug!(job_id = %job_id, status = %job.status, "Skipping job that is no longer queued");
            return;
        }

        if let Err(e) = self.store.set_job_running(job_id, "init").await {
            // another delivery got here first
            warn!(job_id = %job_id, "Unable to mark job running: {}", e);
            return;
        }
        self.log(job_id, &format!("{} job started", now_rfc3339())).await;
        info!(job_id = %job_id, project_id = %job.project_id, job_type = %job.job_type, "Job started");

        match self.execute(&job).await {
            Ok(()) => {
                self.log(job_id, &format!("{} job finished", now_rfc3339())).await;
                if let Err(e) = self.store.set_job_succeeded(job_id).await {
                    error!(job_id = %job_id, "Unable to mark job succeeded: {}", e);
                }
                info!(job_id = %job_id, project_id = %job.project_id, "Job succeeded");
            }
            Err(e) => {
                let message = e.to_string();
                self.log(job_id, &format!("{} error: {}", now_rfc3339(), message)).await;
                if let Err(e) = self.store.set_job_failed(job_id, &message).await {
                    error!(job_id = %job_id, "Unable to mark job failed: {}", e);
                }
                error!(job_id = %job_id, project_id = %job.project_id, "Job failed: {}", message);
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<(), DeployError> {
        let project = self.store.get_project(&job.project_id).await?;
        let kind = job.kind()?;

        match kind {
            JobType::Deploy => self.deploy(&job.id, &project).await?,
            JobType::Start => self.lifecycle(&job.id, &project, ComposeCommand::Up, ContainerOp::Start).await?,
            JobType::Stop => self.lifecycle(&job.id, &project, ComposeCommand::Stop, ContainerOp::Stop).await?,
            JobType::Pause => self.lifecycle(&job.id, &project, ComposeCommand::Pause, ContainerOp::Pause).await?,
            JobType::Unpause => {
                self.lifecycle(&job.id, &project, ComposeCommand::Unpause, ContainerOp::Unpause)
                    .await?
            }
            JobType::Delete => return self.delete(&job.id, &project).await,
        }

        self.store
            .set_project_status(&project.id, kind.settled_status())
            .await
    }

    // ------------------------------ deploy ------------------------------ //

    async fn deploy(&self, job_id: &str, project: &Project) -> Result<(), DeployError> {
        self.step(job_id, "set_project_status").await;
        self.store
            .set_project_status(&project.id, ProjectStatus::Deploying)
            .await?;

        let result = self.deploy_project(job_id, project).await;
        if result.is_err() {
            if let Err(e) = self
                .store
                .set_project_status(&project.id, ProjectStatus::Failed)
                .await
            {
                error!(project_id = %project.id, "Unable to mark project failed: {}", e);
            }
        }
        result
    }

    async fn deploy_project(&self, job_id: &str, project: &Project) -> Result<(), DeployError> {
        self.sync_source(job_id, project).await?;

        let work_dir = work_dir(&self.layout, project)?;
        self.step(job_id, "write_config").await;
        self.materialize(job_id, project, &work_dir).await?;

        match project.effective_deploy_type() {
            EffectiveDeployType::Compose => {
                self.compose(job_id, project, work_dir, ComposeCommand::Up).await
            }
            EffectiveDeployType::Dockerfile => {
                self.step(job_id, "docker_cleanup").await;
                self.engine.remove_containers(&project.id).await?;

                self.step(job_id, "docker_build").await;
                self.engine
                    .build_image(&project.id, &work_dir, &project.dockerfile_path)
                    .await?;

                self.step(job_id, "docker_run").await;
                self.engine
                    .run_container(&project.id, project.host_port, project.container_port)
                    .await
            }
        }
    }

    /// Write literal Dockerfile/compose text into the working copy
    async fn materialize(&self, job_id: &str, project: &Project, work_dir: &Path) -> Result<(), DeployError> {
        if !project.dockerfile_content.is_empty() {
            let rel = non_empty_or(&project.dockerfile_path, DEFAULT_DOCKERFILE);
            let path = safe_join(work_dir, rel)?;
            File::new(&path)
                .write_string(&project.dockerfile_content)
                .await?;
            self.log(job_id, &format!("wrote Dockerfile to {rel}")).await;
        }

        if !project.compose_content.is_empty() {
            let normalized = project.normalized_compose_file();
            let rel = non_empty_or(&normalized, DEFAULT_COMPOSE_FILE);
            let path = safe_join(work_dir, rel)?;
            File::new(&path)
                .write_string(&project.compose_content)
                .await?;
            self.log(job_id, &format!("wrote compose file to {rel}")).await;
        }
        Ok(())
    }

    // ------------------------ start/stop/pause/unpause ------------------------ //

    async fn lifecycle(
        &self,
        job_id: &str,
        project: &Project,
        command: ComposeCommand,
        op: ContainerOp,
    ) -> Result<(), DeployError> {
        match project.effective_deploy_type() {
            EffectiveDeployType::Compose => {
                self.sync_source(job_id, project).await?;
                let work_dir = work_dir(&self.layout, project)?;
                self.compose(job_id, project, work_dir, command).await
            }
            EffectiveDeployType::Dockerfile => {
                self.step(job_id, op.step()).await;
                let count = match op {
                    ContainerOp::Start => self.engine.start_containers(&project.id).await?,
                    ContainerOp::Stop => {
                        self.engine
                            .stop_containers(&project.id, self.options.stop_timeout)
                            .await?
                    }
                    ContainerOp::Pause => self.engine.pause_containers(&project.id).await?,
                    ContainerOp::Unpause => self.engine.unpause_containers(&project.id).await?,
                };
                self.log(job_id, &format!("{} {} container(s)", op.verb(), count))
                    .await;
                Ok(())
            }
        }
    }

    // ------------------------------ delete ------------------------------ //

    async fn delete(&self, job_id: &str, project: &Project) -> Result<(), DeployError> {
        let mut report = CleanupReport::new();

        self.step(job_id, "docker_cleanup").await;
        report.record(
            CleanupKind::Containers,
            self.engine.remove_containers(&project.id).await,
        );
        report.record(
            CleanupKind::Networks,
            self.engine.remove_networks(&project.id).await,
        );
        report.record(CleanupKind::Image, self.engine.remove_image(&project.id).await);

        self.step(job_id, "remove_repo").await;
        report.record(
            CleanupKind::WorkingCopy,
            remove_working_copy(self.layout.repo_dir(&project.id)).await,
        );

        if report.is_clean() {
            info!(job_id = %job_id, project_id = %project.id, "Removed project resources");
        }
        for line in report.log_lines() {
            warn!(job_id = %job_id, project_id = %project.id, "{}", line);
            self.log(job_id, &line).await;
        }

        self.step(job_id, "mark_deleted").await;
        self.store.mark_project_deleted(&project.id).await
    }

    // ------------------------------ helpers ------------------------------ //

    async fn sync_source(&self, job_id: &str, project: &Project) -> Result<(), DeployError> {
        self.step(job_id, "sync_repo").await;

        let repo_dir = self.layout.repo_dir(&project.id);
        let verb = if repo_dir.join(".git").exists() {
            "fetching"
        } else {
            "cloning"
        };
        self.log(job_id, &format!("{verb} {}", project.git_url)).await;

        let outcome = self
            .source
            .sync(&project.git_url, &project.git_ref, &repo_dir)
            .await?;
        if outcome == SyncOutcome::Recloned {
            self.log(job_id, &format!("fetch failed, cloned {} again", project.git_url))
                .await;
        }
        Ok(())
    }

    async fn compose(
        &self,
        job_id: &str,
        project: &Project,
        work_dir: PathBuf,
        command: ComposeCommand,
    ) -> Result<(), DeployError> {
        self.step(job_id, command.step()).await;
        let host_dir = host_work_dir(self.host_layout.as_ref(), project)?;
        let spec = ComposeSpec::for_project(project, work_dir, host_dir);
        self.compose.invoke(&spec, command).await
    }

    async fn step(&self, job_id: &str, step: &str) {
        debug!(job_id = %job_id, step = %step, "Job step");
        if let Err(e) = self.store.set_job_step(job_id, step).await {
            warn!(job_id = %job_id, "Unable to record step {}: {}", step, e);
        }
    }

    async fn log(&self, job_id: &str, line: &str) {
        if let Err(e) = self.store.append_job_log(job_id, line).await {
            warn!(job_id = %job_id, "Unable to append job log: {}", e);
        }
    }
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}
