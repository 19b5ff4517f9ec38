//! Best-effort teardown bookkeeping

use std::fmt;

use crate::errors::DeployError;

/// Kind of resource removed during project deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupKind {
    Containers,
    Networks,
    Image,
    WorkingCopy,
}

impl fmt::Display for CleanupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CleanupKind::Containers => "containers",
            CleanupKind::Networks => "networks",
            CleanupKind::Image => "image",
            CleanupKind::WorkingCopy => "working copy",
        };
        f.write_str(s)
    }
}

/// A teardown step that failed without stopping the deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub kind: CleanupKind,
    pub error: String,
}

/// Outcome of a deletion's teardown steps
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of one teardown step, keeping the error if any
    pub fn record<T>(&mut self, kind: CleanupKind, result: Result<T, DeployError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.failures.push(CleanupFailure {
                    kind,
                    error: e.to_string(),
                });
                None
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// One `cleanup <kind> failed: <err>` line per failure
    pub fn log_lines(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|f| format!("cleanup {} failed: {}", f.kind, f.error))
            .collect()
    }
}
