//! Error types for the deployment worker

use thiserror::Error;

/// Main error type for the deployment worker
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("docker: {0}")]
    DockerError(#[from] bollard::errors::Error),

    #[error("git: {0}")]
    GitError(#[from] git2::Error),

    #[error("{0}")]
    Validation(String),

    #[error("sync repo: {0}")]
    Sync(String),

    #[error("docker build: {0}")]
    Build(String),

    #[error("{0}")]
    Compose(String),

    #[error("store: {0}")]
    Store(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("unknown job type: {0:?}")]
    UnknownJobType(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Shorthand for a validation failure raised before any side effect
    pub fn validation(msg: impl Into<String>) -> Self {
        DeployError::Validation(msg.into())
    }

    /// Whether this error means the record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, DeployError::NotFound(_))
    }
}

impl From<tokio::task::JoinError> for DeployError {
    fn from(err: tokio::task::JoinError) -> Self {
        DeployError::Internal(err.to_string())
    }
}
