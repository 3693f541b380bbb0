use emitter_types::MessageBatch;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::queue::{QueueClient, SendError};

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("worker {worker} stopped: {source}")]
    Send {
        worker: usize,
        #[source]
        source: SendError,
    },
    #[error("an emission worker panicked")]
    WorkerPanicked,
}

/// What a completed emission run sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmissionSummary {
    pub workers: usize,
    pub batches_sent: u64,
}

/// Send full batches of `payload` until `duration` has elapsed.
///
/// The first send error ends the loop. Returns the number of batches sent.
pub async fn run_worker<Q: QueueClient>(
    worker: usize,
    queue: &Q,
    payload: &str,
    duration: Duration,
) -> Result<u64, SendError> {
    let start = Instant::now();
    let mut batches_sent = 0u64;

    while start.elapsed() < duration {
        let batch = MessageBatch::uniform(payload);
        if let Err(e) = queue.send_batch(&batch).await {
            warn!(worker, batches_sent, "Worker aborted: {}", e);
            return Err(e);
        }
        batches_sent += 1;
    }

    debug!(worker, batches_sent, "Worker finished");
    Ok(batches_sent)
}

/// Run `num_workers` concurrent workers against `queue` and wait for all of them.
///
/// A failing worker does not stop the others. The first failure observed is
/// returned once every worker is done.
pub async fn emit<Q: QueueClient>(
    queue: &Q,
    payload: Arc<str>,
    duration: Duration,
    num_workers: usize,
) -> Result<EmissionSummary, EmitError> {
    info!(
        "Starting {} workers for {:.3}s",
        num_workers,
        duration.as_secs_f64()
    );

    let mut set = JoinSet::new();
    for worker in 0..num_workers {
        let queue = queue.clone();
        let payload = Arc::clone(&payload);
        set.spawn(async move {
            let result = run_worker(worker, &queue, &payload, duration).await;
            (worker, result)
        });
    }

    let mut batches_sent = 0u64;
    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(sent))) => batches_sent += sent,
            Ok((worker, Err(source))) => {
                first_error.get_or_insert(EmitError::Send { worker, source });
            }
            Err(e) => {
                error!("Worker task panicked: {:#}", e);
                first_error.get_or_insert(EmitError::WorkerPanicked);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    Ok(EmissionSummary {
        workers: num_workers,
        batches_sent,
    })
}
