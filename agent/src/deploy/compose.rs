//! Docker Compose orchestration

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::deploy::resources::{ResourceNames, PROJECT_LABEL};
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::project::normalize_compose_file;
use crate::models::Project;
use crate::utils::new_id;

/// Compose file used when a project names none
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

static SERVICE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("valid regex"));

/// Captured result of a finished subprocess
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit status as text, e.g. `exit status: 1`
    pub status: String,
    /// Interleaved stdout and stderr
    pub output: String,
}

/// Subprocess execution seam
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandOutput, DeployError>;
}

/// Runs commands on the local system
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandOutput, DeployError> {
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            output: combined,
        })
    }
}

/// Compose subcommand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeCommand {
    Up,
    Stop,
    Pause,
    Unpause,
    /// Full teardown of every service, orphans included
    Down,
}

impl ComposeCommand {
    fn args(&self) -> &'static [&'static str] {
        match self {
            ComposeCommand::Up => &["up", "-d"],
            ComposeCommand::Stop => &["stop"],
            ComposeCommand::Pause => &["pause"],
            ComposeCommand::Unpause => &["unpause"],
            ComposeCommand::Down => &["down", "--remove-orphans"],
        }
    }

    /// Job step label
    pub fn step(&self) -> &'static str {
        match self {
            ComposeCommand::Up => "compose_up",
            ComposeCommand::Stop => "compose_stop",
            ComposeCommand::Pause => "compose_pause",
            ComposeCommand::Unpause => "compose_unpause",
            ComposeCommand::Down => "compose_down",
        }
    }
}

/// What to run compose against
#[derive(Debug, Clone)]
pub struct ComposeSpec {
    pub project_id: String,
    pub work_dir: PathBuf,
    /// Same directory as seen by the engine host
    pub host_work_dir: Option<PathBuf>,
    pub compose_file: String,
    /// Comma-separated service names; empty means every service
    pub compose_service: String,
}

impl ComposeSpec {
    pub fn for_project(project: &Project, work_dir: PathBuf, host_work_dir: Option<PathBuf>) -> Self {
        Self {
            project_id: project.id.clone(),
            work_dir,
            host_work_dir,
            compose_file: match project.compose_file.trim() {
                "" => DEFAULT_COMPOSE_FILE.to_string(),
                file => file.to_string(),
            },
            compose_service: project.compose_service.clone(),
        }
    }
}

/// Split a comma-separated service selector, dropping blanks
pub fn parse_services(selector: &str) -> Vec<String> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reject the whole selector if any name is not a plain identifier
pub fn validate_services(services: &[String]) -> Result<(), DeployError> {
    match services.iter().find(|s| !SERVICE_NAME.is_match(s)) {
        Some(bad) => Err(DeployError::validation(format!("invalid compose_service: {bad}"))),
        None => Ok(()),
    }
}

/// Override layer attaching the project label to exactly `services`
pub fn override_content(project_id: &str, services: &[String]) -> String {
    let mut content = String::from("services:\n");
    for svc in services {
        content.push_str(&format!(
            "  {svc}:\n    labels:\n      {PROJECT_LABEL}: {project_id:?}\n"
        ));
    }
    content
}

/// Compose command line front-end
#[derive(Clone)]
pub struct Compose {
    runner: Arc<dyn CommandRunner>,
    docker_bin: String,
    override_dir: PathBuf,
    host_project_dir: bool,
}

impl Compose {
    pub fn new(runner: Arc<dyn CommandRunner>, docker_bin: impl Into<String>) -> Self {
        Self {
            runner,
            docker_bin: docker_bin.into(),
            override_dir: std::env::temp_dir(),
            host_project_dir: false,
        }
    }

    /// Place generated override files somewhere other than the system temp dir
    pub fn with_override_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.override_dir = dir.into();
        self
    }

    /// Pass the host-side work dir as `--project-directory`.
    ///
    /// Relative `build`, `env_file` and `.env` paths then resolve against the
    /// host path, so this only suits compose files without local builds.
    pub fn with_host_project_dir(mut self, enabled: bool) -> Self {
        self.host_project_dir = enabled;
        self
    }

    /// Run `docker compose` for `spec`
    pub async fn invoke(&self, spec: &ComposeSpec, command: ComposeCommand) -> Result<(), DeployError> {
        if spec.project_id.is_empty() {
            return Err(DeployError::validation("project id is required"));
        }
        if spec.work_dir.as_os_str().is_empty() {
            return Err(DeployError::validation("work dir is required"));
        }
        if spec.compose_file.trim().is_empty() {
            return Err(DeployError::validation("compose_file is required"));
        }

        let services = match command {
            ComposeCommand::Down => Vec::new(),
            _ => parse_services(&spec.compose_service),
        };
        validate_services(&services)?;

        let compose_file = normalize_compose_file(&spec.compose_file, &spec.project_id);
        let compose_file = if Path::new(&compose_file).is_absolute() {
            PathBuf::from(compose_file)
        } else {
            spec.work_dir.join(compose_file)
        };

        let names = ResourceNames::for_project(&spec.project_id);
        let mut args: Vec<String> = vec!["compose".into(), "-p".into(), names.compose_project];
        if let Some(host_dir) = spec.host_work_dir.as_ref().filter(|_| self.host_project_dir) {
            args.push("--project-directory".into());
            args.push(host_dir.display().to_string());
        }
        args.push("-f".into());
        args.push(compose_file.display().to_string());

        let override_file = if services.is_empty() {
            None
        } else {
            let file = File::new(
                self.override_dir
                    .join(format!("last-deploy-compose-{}.yml", new_id())),
            );
            file.write_string(&override_content(&spec.project_id, &services))
                .await?;
            args.push("-f".into());
            args.push(file.path().display().to_string());
            Some(file)
        };

        args.extend(command.args().iter().map(|a| a.to_string()));
        args.extend(services.iter().cloned());

        info!(project_id = %spec.project_id, "Running {} {}", self.docker_bin, args.join(" "));
        let result = self.runner.run(&self.docker_bin, &args, &spec.work_dir).await;

        if let Some(file) = override_file {
            if let Err(e) = file.delete().await {
                warn!("Failed to remove compose override {}: {}", file.path().display(), e);
            }
        }

        let output = result.map_err(|e| {
            DeployError::Compose(format!("{} {}: {}", self.docker_bin, args.join(" "), e))
        })?;
        if !output.success {
            return Err(DeployError::Compose(format!(
                "{} {}: {}: {}",
                self.docker_bin,
                args.join(" "),
                output.status,
                output.output.trim()
            )));
        }
        debug!(project_id = %spec.project_id, "compose output: {}", output.output.trim());
        Ok(())
    }
}
