//! Detection draft models

use serde::{Deserialize, Serialize};

/// What the detector found in a fresh clone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftType {
    Compose,
    Dockerfile,
    #[default]
    None,
}

/// Detector output, consumed verbatim
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub deploy_type: DraftType,
    #[serde(default)]
    pub dockerfile_path: String,
    #[serde(default)]
    pub dockerfile_content: String,
    #[serde(default)]
    pub compose_path: String,
    #[serde(default)]
    pub compose_content: String,
    #[serde(default)]
    pub services: Vec<String>,
}

/// A short-lived detection result awaiting project creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDraft {
    pub id: String,
    pub name: String,
    pub git_url: String,
    #[serde(flatten)]
    pub detection: Detection,
    /// Temporary clone directory, removed with the draft
    pub repo_dir: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl ProjectDraft {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}
