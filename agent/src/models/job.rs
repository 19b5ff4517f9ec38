//! Job models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Lifecycle operation requested for a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Deploy,
    Start,
    Stop,
    Pause,
    Unpause,
    Delete,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Deploy => "deploy",
            JobType::Start => "start",
            JobType::Stop => "stop",
            JobType::Pause => "pause",
            JobType::Unpause => "unpause",
            JobType::Delete => "delete",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deploy" => Ok(JobType::Deploy),
            "start" => Ok(JobType::Start),
            "stop" => Ok(JobType::Stop),
            "pause" => Ok(JobType::Pause),
            "unpause" => Ok(JobType::Unpause),
            "delete" => Ok(JobType::Delete),
            other => Err(DeployError::UnknownJobType(other.to_string())),
        }
    }
}

/// Job status; moves only forward
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A requested operation and its progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub project_id: String,
    /// Operation as written by the producer; see [`Job::kind`]
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub error: String,
    pub requested_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

impl Job {
    /// A fresh queued job
    pub fn queued(id: impl Into<String>, project_id: impl Into<String>, job_type: JobType, requested_at: i64) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            job_type: job_type.as_str().to_string(),
            status: JobStatus::Queued,
            current_step: String::new(),
            log: String::new(),
            error: String::new(),
            requested_at,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn kind(&self) -> Result<JobType, DeployError> {
        self.job_type.parse()
    }
}
