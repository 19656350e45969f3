//! Wall-clock race between a blocking job and its budget.
//!
//! The job runs on a dedicated OS thread and reports back over a oneshot
//! channel. If the budget elapses first the caller gets [`WorkerError::TimedOut`]
//! and the job's eventual result is discarded.

use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Stack reserved for each worker thread. Interpreters recurse while parsing.
const WORKER_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Why a raced job produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkerError {
    /// The budget elapsed first.
    TimedOut,
    /// The worker died or could not start.
    Lost(String),
}

/// Run `job` on its own thread and wait at most `budget` for its value.
pub(crate) async fn race<T, F>(name: &str, budget: Duration, job: F) -> Result<T, WorkerError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (result_tx, result_rx) = oneshot::channel();

    thread::Builder::new()
        .name(format!("codepair-{name}"))
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || {
            // Receiver is gone when the race was already lost.
            let _ = result_tx.send(job());
        })
        .map_err(|e| WorkerError::Lost(format!("Failed to start execution worker: {e}")))?;

    match timeout(budget, result_rx).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => {
            warn!(worker = name, "Execution worker stopped without a result");
            Err(WorkerError::Lost(
                "Execution worker stopped unexpectedly".to_string(),
            ))
        }
        Err(_) => {
            debug!(worker = name, ?budget, "Execution budget elapsed");
            Err(WorkerError::TimedOut)
        }
    }
}
