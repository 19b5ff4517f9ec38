//! Bounded single-consumer hand-off of job ids

use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::DeployError;

/// Producer side; clone freely
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<String>,
}

/// Consumer side, owned by the deployer alone
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::Receiver<String>,
}

/// Create a queue holding at most `capacity` pending ids
pub fn channel(capacity: usize) -> (JobQueue, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (JobQueue { tx }, JobReceiver { rx })
}

impl JobQueue {
    /// Hand `job_id` to the worker, waiting while the buffer is full
    pub async fn enqueue(&self, job_id: &str) -> Result<(), DeployError> {
        self.tx
            .send(job_id.to_string())
            .await
            .map_err(|_| DeployError::ShutdownError("job queue closed".to_string()))?;
        debug!(job_id = %job_id, "Job enqueued");
        Ok(())
    }
}

impl JobReceiver {
    /// Next id in enqueue order, or `None` once every producer is gone
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}
