//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::deploy::compose::{Compose, SystemRunner};
use crate::deploy::docker::DockerEngine;
use crate::deploy::git::GitSync;
use crate::errors::DeployError;
use crate::store::Store;
use crate::workers::deployer::{self, Deployer};
use crate::workers::janitor;
use crate::workers::queue::JobReceiver;
use crate::workers::recovery::{fail_interrupted, recover_persisted};

/// Run the deployment worker process
pub async fn run(
    version: String,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DeployError> {
    info!("Initializing lastdeploy {}...", version);

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    // holds the queue's producer side; the deployer stops once every producer is gone
    let app_state = match init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to start: {}", e);
            shutdown_manager.shutdown().await?;
            return Err(e);
        }
    };

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    let result = shutdown_manager.shutdown().await;
    drop(app_state);
    result
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, DeployError> {
    let (app_state, receiver) = AppState::init(options).await?;
    let app_state = Arc::new(app_state);

    let interrupted = fail_interrupted(app_state.store.as_ref()).await?;
    if interrupted > 0 {
        warn!("Marked {} interrupted job(s) as failed", interrupted);
    }

    init_deployer_worker(
        options,
        app_state.clone(),
        receiver,
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await?;

    // after the deployer is consuming, so a full queue cannot stall startup
    recover_persisted(app_state.store.as_ref(), &app_state.queue).await?;

    init_janitor_worker(
        options.janitor.clone(),
        app_state.store.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await?;

    Ok(app_state)
}

async fn init_deployer_worker(
    options: &AppOptions,
    app_state: Arc<AppState>,
    receiver: JobReceiver,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DeployError> {
    info!("Initializing deployer worker...");

    let engine = Arc::new(DockerEngine::connect()?);
    let compose = Compose::new(Arc::new(SystemRunner), options.docker_bin.clone())
        .with_host_project_dir(options.compose_host_project_dir);
    let deployer = Deployer::new(
        app_state.store.clone(),
        engine,
        compose,
        Arc::new(GitSync),
        options.layout.clone(),
        options.host_layout.clone(),
        deployer::Options {
            stop_timeout: options.deployer.stop_timeout,
        },
    );

    let deployer_handle = tokio::spawn(async move {
        deployer
            .run(
                receiver,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
    });

    shutdown_manager.with_deployer_worker_handle(deployer_handle)?;
    Ok(())
}

async fn init_janitor_worker(
    options: janitor::Options,
    store: Arc<dyn Store>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DeployError> {
    info!("Initializing janitor worker...");

    let janitor_handle = tokio::spawn(async move {
        janitor::run(
            &options,
            store.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_janitor_worker_handle(janitor_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    deployer_worker_handle: Option<JoinHandle<()>>,
    janitor_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            deployer_worker_handle: None,
            janitor_worker_handle: None,
        }
    }

    pub fn with_deployer_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), DeployError> {
        if self.deployer_worker_handle.is_some() {
            return Err(DeployError::ShutdownError("deployer_handle already set".to_string()));
        }
        self.deployer_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_janitor_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), DeployError> {
        if self.janitor_worker_handle.is_some() {
            return Err(DeployError::ShutdownError("janitor_handle already set".to_string()));
        }
        self.janitor_worker_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), DeployError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, abandoning the running job",
                    self.lifecycle_options.max_shutdown_delay
                );
                Err(DeployError::ShutdownError("timed out".to_string()))
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), DeployError> {
        info!("Shutting down lastdeploy...");

        // 1. Janitor worker
        if let Some(handle) = self.janitor_worker_handle.take() {
            handle.await.map_err(|e| DeployError::ShutdownError(e.to_string()))?;
        }

        // 2. Deployer worker, after its current job
        if let Some(handle) = self.deployer_worker_handle.take() {
            handle.await.map_err(|e| DeployError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
