//! Shared fakes for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use lastdeploy::deploy::compose::{CommandOutput, CommandRunner, Compose};
use lastdeploy::deploy::docker::ContainerEngine;
use lastdeploy::deploy::git::{SourceSync, SyncOutcome};
use lastdeploy::errors::DeployError;
use lastdeploy::models::{DeployType, Job, JobType, Project, ProjectStatus};
use lastdeploy::storage::layout::{HostLayout, StorageLayout};
use lastdeploy::store::{JsonStore, Store};
use lastdeploy::workers::deployer::{self, Deployer};
use lastdeploy::workers::queue::{self, JobQueue, JobReceiver};

// ------------------------------ engine ------------------------------ //

/// In-memory container engine; `containers` counts labelled containers per project
#[derive(Default)]
pub struct FakeEngine {
    pub calls: Mutex<Vec<String>>,
    pub containers: Mutex<HashMap<String, usize>>,
    pub fail_build: Mutex<Option<String>>,
    pub fail_cleanup: Mutex<bool>,
}

impl FakeEngine {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn containers(&self, project_id: &str) -> usize {
        self.containers
            .lock()
            .unwrap()
            .get(project_id)
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn cleanup_error(&self, what: &str) -> Result<(), DeployError> {
        if *self.fail_cleanup.lock().unwrap() {
            return Err(DeployError::NotFound(format!("{what} already gone")));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn build_image(
        &self,
        project_id: &str,
        context_dir: &Path,
        dockerfile_path: &str,
    ) -> Result<(), DeployError> {
        self.record(format!(
            "build {project_id} {} {dockerfile_path}",
            context_dir.display()
        ));
        if let Some(msg) = self.fail_build.lock().unwrap().clone() {
            return Err(DeployError::Build(msg));
        }
        Ok(())
    }

    async fn run_container(
        &self,
        project_id: &str,
        host_port: u16,
        container_port: u16,
    ) -> Result<(), DeployError> {
        self.record(format!("run {project_id} 127.0.0.1:{host_port}->{container_port}/tcp"));
        self.containers
            .lock()
            .unwrap()
            .insert(project_id.to_string(), 1);
        Ok(())
    }

    async fn start_containers(&self, project_id: &str) -> Result<usize, DeployError> {
        self.record(format!("start {project_id}"));
        Ok(self.containers(project_id))
    }

    async fn stop_containers(&self, project_id: &str, timeout: Duration) -> Result<usize, DeployError> {
        self.record(format!("stop {project_id} {}s", timeout.as_secs()));
        Ok(self.containers(project_id))
    }

    async fn pause_containers(&self, project_id: &str) -> Result<usize, DeployError> {
        self.record(format!("pause {project_id}"));
        Ok(self.containers(project_id))
    }

    async fn unpause_containers(&self, project_id: &str) -> Result<usize, DeployError> {
        self.record(format!("unpause {project_id}"));
        Ok(self.containers(project_id))
    }

    async fn remove_containers(&self, project_id: &str) -> Result<usize, DeployError> {
        self.record(format!("remove_containers {project_id}"));
        self.cleanup_error("containers")?;
        Ok(self
            .containers
            .lock()
            .unwrap()
            .remove(project_id)
            .unwrap_or(0))
    }

    async fn remove_networks(&self, project_id: &str) -> Result<usize, DeployError> {
        self.record(format!("remove_networks {project_id}"));
        self.cleanup_error("networks")?;
        Ok(0)
    }

    async fn remove_image(&self, project_id: &str) -> Result<(), DeployError> {
        self.record(format!("remove_image {project_id}"));
        self.cleanup_error("image")
    }
}

// ------------------------------ runner ------------------------------ //

/// One compose invocation and the override layer present while it ran
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub override_content: Option<String>,
}

#[derive(Default)]
pub struct RecordingRunner {
    pub commands: Mutex<Vec<RecordedCommand>>,
    pub fail_with: Mutex<Option<String>>,
}

impl RecordingRunner {
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandOutput, DeployError> {
        let override_content = args
            .iter()
            .filter(|a| a.contains("last-deploy-compose-"))
            .find_map(|a| std::fs::read_to_string(a).ok());
        self.commands.lock().unwrap().push(RecordedCommand {
            program: program.to_string(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
            override_content,
        });

        match self.fail_with.lock().unwrap().clone() {
            Some(output) => Ok(CommandOutput {
                success: false,
                status: "exit status: 1".to_string(),
                output,
            }),
            None => Ok(CommandOutput {
                success: true,
                status: "exit status: 0".to_string(),
                output: String::new(),
            }),
        }
    }
}

// ------------------------------ source ------------------------------ //

/// Pretends to clone: creates the destination with a `.git` marker and the given files
#[derive(Default)]
pub struct FakeSource {
    pub syncs: Mutex<Vec<(String, String, PathBuf)>>,
    pub files: Mutex<Vec<(String, String)>>,
    pub fail_with: Mutex<Option<String>>,
}

impl FakeSource {
    pub fn with_file(&self, rel: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .push((rel.to_string(), content.to_string()));
    }

    pub fn syncs(&self) -> Vec<(String, String, PathBuf)> {
        self.syncs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceSync for FakeSource {
    async fn sync(&self, url: &str, git_ref: &str, dest: &Path) -> Result<SyncOutcome, DeployError> {
        self.syncs
            .lock()
            .unwrap()
            .push((url.to_string(), git_ref.to_string(), dest.to_path_buf()));
        if let Some(msg) = self.fail_with.lock().unwrap().clone() {
            return Err(DeployError::Sync(msg));
        }

        let outcome = if dest.join(".git").exists() {
            SyncOutcome::Fetched
        } else {
            SyncOutcome::Cloned
        };
        std::fs::create_dir_all(dest.join(".git"))?;
        for (rel, content) in self.files.lock().unwrap().iter() {
            let path = dest.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }
        Ok(outcome)
    }
}

// ------------------------------ harness ------------------------------ //

pub struct Harness {
    pub dir: TempDir,
    pub layout: StorageLayout,
    pub store: Arc<JsonStore>,
    pub engine: Arc<FakeEngine>,
    pub runner: Arc<RecordingRunner>,
    pub source: Arc<FakeSource>,
    pub deployer: Deployer,
    pub queue: JobQueue,
    pub receiver: Option<JobReceiver>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(false, false)
    }

    /// Worker whose data dir is also known by a host-side path under `host/`
    pub fn with_host_layout(host_project_dir: bool) -> Self {
        Self::build(true, host_project_dir)
    }

    fn build(host_layout: bool, host_project_dir: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().join("data"));
        let store = Arc::new(JsonStore::ephemeral());
        let engine = Arc::new(FakeEngine::default());
        let runner = Arc::new(RecordingRunner::default());
        let source = Arc::new(FakeSource::default());

        let compose = Compose::new(runner.clone(), "docker")
            .with_override_dir(dir.path().join("tmp"))
            .with_host_project_dir(host_project_dir);
        let host = host_layout.then(|| HostLayout::new(dir.path().join("host")));
        let deployer = Deployer::new(
            store.clone(),
            engine.clone(),
            compose,
            source.clone(),
            layout.clone(),
            host,
            deployer::Options {
                stop_timeout: Duration::from_secs(10),
            },
        );
        let (queue, receiver) = queue::channel(16);

        Self {
            dir,
            layout,
            store,
            engine,
            runner,
            source,
            deployer,
            queue,
            receiver: Some(receiver),
        }
    }

    pub async fn add_project(&self, project: Project) -> Project {
        self.store.create_project(project).await.unwrap()
    }

    /// Persist a queued job and run it to completion
    pub async fn run_job(&self, project_id: &str, job_type: JobType) -> Job {
        let job = self.submit(project_id, job_type).await;
        self.deployer.process(&job.id).await;
        self.store.get_job(&job.id).await.unwrap()
    }

    pub async fn submit(&self, project_id: &str, job_type: JobType) -> Job {
        self.store
            .create_job(Job::queued(
                lastdeploy::utils::new_id(),
                project_id,
                job_type,
                lastdeploy::utils::now_unix(),
            ))
            .await
            .unwrap()
    }

    /// Project record including soft-deleted ones
    pub async fn project_status(&self, project_id: &str) -> Option<ProjectStatus> {
        self.store
            .project_record(project_id)
            .await
            .map(|p| p.last_status)
    }

    pub fn repo_dir(&self, project_id: &str) -> PathBuf {
        self.layout.repo_dir(project_id)
    }
}

// ------------------------------ fixtures ------------------------------ //

pub fn dockerfile_project(id: &str, host_port: u16, container_port: u16) -> Project {
    Project {
        id: id.to_string(),
        name: format!("{id}-name"),
        git_url: format!("https://git.example.com/{id}.git"),
        git_ref: "main".to_string(),
        repo_subdir: String::new(),
        deploy_type: DeployType::Dockerfile,
        compose_file: String::new(),
        compose_service: String::new(),
        dockerfile_path: "Dockerfile".to_string(),
        dockerfile_content: String::new(),
        compose_content: String::new(),
        host_port,
        container_port,
        last_status: ProjectStatus::Unknown,
        last_status_at: None,
        deleted_at: None,
        created_at: 0,
        updated_at: 0,
    }
}

pub fn compose_project(id: &str, compose_service: &str) -> Project {
    Project {
        deploy_type: DeployType::Compose,
        compose_file: "docker-compose.yml".to_string(),
        compose_service: compose_service.to_string(),
        dockerfile_path: String::new(),
        host_port: 8080,
        container_port: 80,
        ..dockerfile_project(id, 8080, 80)
    }
}

pub const TWO_SERVICE_COMPOSE: &str = r#"services:
  web:
    image: nginx
    ports:
      - "8080:80"
  db:
    image: postgres
    ports:
      - "5433:5432"
"#;
