//! Project models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Deploy type as configured on the project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployType {
    #[default]
    Auto,
    Dockerfile,
    Compose,
}

/// Deploy type after resolving `auto`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveDeployType {
    Dockerfile,
    Compose,
}

impl DeployType {
    /// An explicit type wins; `auto` means compose when a compose file is set
    pub fn resolve(&self, compose_file: &str) -> EffectiveDeployType {
        match self {
            DeployType::Compose => EffectiveDeployType::Compose,
            DeployType::Dockerfile => EffectiveDeployType::Dockerfile,
            DeployType::Auto if !compose_file.trim().is_empty() => EffectiveDeployType::Compose,
            DeployType::Auto => EffectiveDeployType::Dockerfile,
        }
    }
}

impl FromStr for DeployType {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(DeployType::Auto),
            "dockerfile" => Ok(DeployType::Dockerfile),
            "compose" => Ok(DeployType::Compose),
            other => Err(DeployError::validation(format!("invalid deploy_type: {other}"))),
        }
    }
}

/// Operational status of a project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Unknown,
    Deploying,
    Running,
    Paused,
    Stopped,
    Failed,
    Deleted,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectStatus::Unknown => "unknown",
            ProjectStatus::Deploying => "deploying",
            ProjectStatus::Running => "running",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Stopped => "stopped",
            ProjectStatus::Failed => "failed",
            ProjectStatus::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// A deployable project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub git_url: String,
    #[serde(default)]
    pub git_ref: String,
    #[serde(default)]
    pub repo_subdir: String,
    #[serde(default)]
    pub deploy_type: DeployType,
    #[serde(default)]
    pub compose_file: String,
    /// Comma-separated compose services; empty means all
    #[serde(default)]
    pub compose_service: String,
    #[serde(default)]
    pub dockerfile_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dockerfile_content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compose_content: String,
    pub host_port: u16,
    pub container_port: u16,
    #[serde(default)]
    pub last_status: ProjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Project {
    pub fn effective_deploy_type(&self) -> EffectiveDeployType {
        self.deploy_type.resolve(&self.compose_file)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Compose file path relative to the working directory
    pub fn normalized_compose_file(&self) -> String {
        normalize_compose_file(&self.compose_file, &self.id)
    }
}

/// Strip an accidental `.../<project_id>/` prefix from a stored compose path.
///
/// Older records sometimes carry `data/repos/<id>/docker-compose.yml`.
pub fn normalize_compose_file(compose_file: &str, project_id: &str) -> String {
    let normalized = compose_file.replace('\\', "/");
    let marker = format!("{project_id}/");
    match normalized.find(&marker) {
        Some(idx) if !project_id.is_empty() => normalized[idx + marker.len()..].to_string(),
        _ => compose_file.to_string(),
    }
}
