//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::errors::DeployError;
use crate::projects::ProjectService;
use crate::store::{JsonStore, Store};
use crate::workers::queue::{self, JobQueue, JobReceiver};

/// Shared handles for everything that produces jobs
pub struct AppState {
    /// Record store
    pub store: Arc<dyn Store>,

    /// Producer side of the job queue
    pub queue: JobQueue,

    /// Project creation and job submission
    pub projects: Arc<ProjectService>,
}

impl AppState {
    /// Prepare the data directory, open the record store and create the queue.
    ///
    /// The receiver goes to the deployer and nowhere else.
    pub async fn init(options: &AppOptions) -> Result<(Self, JobReceiver), DeployError> {
        info!("Initializing application state...");

        options.layout.setup().await?;
        let store: Arc<dyn Store> = Arc::new(JsonStore::open(options.layout.db_file()).await?);

        let (queue, receiver) = queue::channel(options.queue_capacity);
        let projects = Arc::new(ProjectService::new(
            store.clone(),
            queue.clone(),
            options.draft_ttl,
        ));

        let state = Self {
            store,
            queue,
            projects,
        };
        Ok((state, receiver))
    }
}
