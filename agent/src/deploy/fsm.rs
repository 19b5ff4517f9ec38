//! Finite State Machine for job lifecycle

use crate::errors::DeployError;
use crate::models::{JobStatus, JobType, ProjectStatus};

/// Job event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// Worker picked the job up
    Start,

    /// Operation completed
    Succeed,

    /// Operation failed with an error message
    Fail(String),
}

impl JobStatus {
    /// Process an event and return the next status
    pub fn apply(&self, event: &JobEvent) -> Result<JobStatus, DeployError> {
        match (self, event) {
            (JobStatus::Queued, JobEvent::Start) => Ok(JobStatus::Running),
            (JobStatus::Running, JobEvent::Succeed) => Ok(JobStatus::Succeeded),
            (JobStatus::Running, JobEvent::Fail(_)) => Ok(JobStatus::Failed),

            // Invalid transitions
            (state, event) => Err(DeployError::InvalidTransition(format!(
                "{state} -> {event:?}"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl JobType {
    /// Project status left behind by a successful operation
    pub fn settled_status(&self) -> ProjectStatus {
        match self {
            JobType::Deploy | JobType::Start | JobType::Unpause => ProjectStatus::Running,
            JobType::Stop => ProjectStatus::Stopped,
            JobType::Pause => ProjectStatus::Paused,
            JobType::Delete => ProjectStatus::Deleted,
        }
    }
}
