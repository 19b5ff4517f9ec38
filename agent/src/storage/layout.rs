//! Storage layout configuration

use std::path::PathBuf;

use tokio::fs;

use crate::errors::DeployError;
use crate::filesys::file::File;

/// On-disk layout under the data directory
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The record store document
    pub fn db_file(&self) -> File {
        File::new(self.base_dir.join("db.json"))
    }

    /// Root of all project working copies
    pub fn repos_dir(&self) -> PathBuf {
        self.base_dir.join("repos")
    }

    /// Working copy of one project
    pub fn repo_dir(&self, project_id: &str) -> PathBuf {
        self.repos_dir().join(project_id)
    }

    /// Temporary clones made for detection drafts
    pub fn drafts_dir(&self) -> PathBuf {
        self.base_dir.join("drafts")
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), DeployError> {
        fs::create_dir_all(self.repos_dir()).await?;
        fs::create_dir_all(self.drafts_dir()).await?;
        Ok(())
    }
}

/// Host-side view of the data directory, used only to compute bind-mount paths
#[derive(Debug, Clone)]
pub struct HostLayout {
    base_dir: PathBuf,
}

impl HostLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn repo_dir(&self, project_id: &str) -> PathBuf {
        self.base_dir.join("repos").join(project_id)
    }
}
