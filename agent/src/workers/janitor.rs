//! Periodic removal of expired detection drafts

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::deploy::git::remove_working_copy;
use crate::errors::DeployError;
use crate::store::Store;
use crate::utils::now_unix;

/// Janitor worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sweep interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Run the janitor worker
pub async fn run<S, F>(
    options: &Options,
    store: &dyn Store,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Janitor worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Janitor worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        match sweep_expired_drafts(store, now_unix()).await {
            Ok(0) => {}
            Ok(n) => debug!("Removed {} expired draft(s)", n),
            Err(e) => error!("Draft sweep failed: {}", e),
        }
    }
}

/// Delete every draft expired at `now` together with its clone directory
pub async fn sweep_expired_drafts(store: &dyn Store, now: i64) -> Result<usize, DeployError> {
    let expired = store.list_expired_drafts(now).await?;
    let mut removed = 0;
    for draft in expired {
        if !draft.repo_dir.is_empty() {
            if let Err(e) = remove_working_copy(PathBuf::from(&draft.repo_dir)).await {
                warn!("Failed to remove draft clone {}: {}", draft.repo_dir, e);
            }
        }
        store.delete_draft(&draft.id).await?;
        removed += 1;
    }
    Ok(removed)
}
