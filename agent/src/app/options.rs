//! Application configuration options

use std::time::Duration;

use crate::storage::layout::{HostLayout, StorageLayout};
use crate::storage::settings::Settings;
use crate::workers::{deployer, janitor};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Data directory layout
    pub layout: StorageLayout,

    /// Host-side view of the data directory, when it differs
    pub host_layout: Option<HostLayout>,

    /// Bound of the in-memory job queue
    pub queue_capacity: usize,

    /// Lifetime of detection drafts
    pub draft_ttl: Duration,

    /// Container engine command line used for compose
    pub docker_bin: String,

    /// Hand compose the host-side work dir as its project directory
    pub compose_host_project_dir: bool,

    /// Deployer worker options
    pub deployer: deployer::Options,

    /// Janitor worker options
    pub janitor: janitor::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for AppOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout: StorageLayout::new(&settings.data_dir),
            host_layout: settings.host_data_dir.as_ref().map(HostLayout::new),
            queue_capacity: settings.queue_capacity,
            draft_ttl: settings.draft_ttl(),
            docker_bin: settings.docker_bin.clone(),
            compose_host_project_dir: settings.compose_host_project_dir,
            deployer: deployer::Options {
                stop_timeout: settings.stop_timeout(),
            },
            janitor: janitor::Options {
                interval: settings.janitor_interval(),
            },
        }
    }
}

/// Lifecycle options for the worker process
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown; a job still running past it is abandoned
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(600),
        }
    }
}
