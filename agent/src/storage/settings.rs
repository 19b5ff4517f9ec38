//! Settings file management

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

pub const ENV_DATA_DIR: &str = "LAST_DEPLOY_DATA_DIR";
pub const ENV_HOST_DATA_DIR: &str = "LAST_DEPLOY_HOST_DATA_DIR";
pub const ENV_LOG_LEVEL: &str = "LAST_DEPLOY_LOG_LEVEL";
pub const ENV_QUEUE_CAPACITY: &str = "LAST_DEPLOY_QUEUE_CAPACITY";

/// Worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Root of the record file and repository working copies
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Host-visible path of `data_dir` when the worker itself runs in a container
    #[serde(default)]
    pub host_data_dir: Option<PathBuf>,

    /// Bound of the in-memory job hand-off
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Grace period before a stopped container is killed
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Lifetime of a detection draft
    #[serde(default = "default_draft_ttl")]
    pub draft_ttl_secs: u64,

    /// Interval between expired draft sweeps
    #[serde(default = "default_janitor_interval")]
    pub janitor_interval_secs: u64,

    /// Container engine command line used for compose
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,

    /// Run compose with `--project-directory` set to the host-side work dir
    #[serde(default)]
    pub compose_host_project_dir: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_queue_capacity() -> usize {
    128
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_draft_ttl() -> u64 {
    30 * 60
}

fn default_janitor_interval() -> u64 {
    60
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            data_dir: default_data_dir(),
            host_data_dir: None,
            queue_capacity: default_queue_capacity(),
            stop_timeout_secs: default_stop_timeout(),
            draft_ttl_secs: default_draft_ttl(),
            janitor_interval_secs: default_janitor_interval(),
            docker_bin: default_docker_bin(),
            compose_host_project_dir: false,
        }
    }
}

impl Settings {
    /// Load settings from an optional JSON file, then apply environment overrides
    pub async fn load(path: Option<&Path>) -> Result<Self, DeployError> {
        let settings = match path {
            Some(path) => {
                let file = File::new(path);
                file.read_json::<Settings>().await.map_err(|e| {
                    DeployError::ConfigError(format!("read {}: {}", path.display(), e))
                })?
            }
            None => Settings::default(),
        };
        settings.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup; empty values are ignored
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, DeployError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_HOST_DATA_DIR) {
            self.host_data_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_LOG_LEVEL) {
            self.log_level = v.parse().map_err(DeployError::ConfigError)?;
        }
        if let Some(v) = get(ENV_QUEUE_CAPACITY) {
            self.queue_capacity = v
                .trim()
                .parse()
                .map_err(|_| DeployError::ConfigError(format!("{ENV_QUEUE_CAPACITY}: {v}")))?;
        }
        if self.queue_capacity == 0 {
            self.queue_capacity = 1;
        }
        Ok(self)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn draft_ttl(&self) -> Duration {
        Duration::from_secs(self.draft_ttl_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs.max(1))
    }
}
