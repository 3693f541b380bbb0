use anyhow::{Context, Result};
use deadpool::managed::{Manager, Pool, RecycleResult};
use emitter_types::MessageBatch;
use faktory::{Client, Job};
use tracing::{info, warn};

use super::{QueueClient, SendError};

pub const BACKEND: &str = "faktory";

/// Connection pool manager for Faktory clients
struct FaktoryManager;

impl Manager for FaktoryManager {
    type Type = Client;
    type Error = faktory::Error;

    async fn create(&self) -> Result<Client, faktory::Error> {
        // Reads FAKTORY_URL, pinned in `FaktoryQueue::connect`.
        Client::connect().await
    }

    async fn recycle(
        &self,
        _conn: &mut Client,
        _metrics: &deadpool::managed::Metrics,
    ) -> RecycleResult<faktory::Error> {
        // Faktory connections don't need special recycling
        Ok(())
    }
}

/// Pushes each batch entry as a Faktory job, one round trip per batch.
#[derive(Clone)]
pub struct FaktoryQueue {
    pool: Pool<FaktoryManager>,
    queue: String,
    job_kind: String,
}

impl FaktoryQueue {
    /// Must run before any worker is spawned: the client only takes its
    /// address from the environment.
    pub fn connect(url: &str, queue: String, job_kind: String, pool_size: usize) -> Result<Self> {
        std::env::set_var("FAKTORY_URL", url);

        let pool = Pool::builder(FaktoryManager)
            .max_size(pool_size)
            .build()
            .context("Failed to create Faktory connection pool")?;

        info!(
            "Created Faktory connection pool for {} with max size {}",
            url, pool_size
        );

        Ok(Self {
            pool,
            queue,
            job_kind,
        })
    }

    fn jobs(&self, batch: &MessageBatch) -> Vec<Job> {
        batch
            .entries()
            .iter()
            .map(|entry| {
                let mut job = Job::new(self.job_kind.as_str(), vec![entry.body.clone()]);
                job.queue = self.queue.clone();
                job
            })
            .collect()
    }
}

impl QueueClient for FaktoryQueue {
    async fn send_batch(&self, batch: &MessageBatch) -> Result<(), SendError> {
        let jobs = self.jobs(batch);

        let mut client = self.pool.get().await.map_err(|e| SendError::Connection {
            backend: BACKEND,
            message: e.to_string(),
        })?;

        let (_enqueued, failed) =
            client
                .enqueue_many(jobs)
                .await
                .map_err(|e| SendError::Service {
                    backend: BACKEND,
                    message: e.to_string(),
                })?;

        if let Some(failed) = failed {
            warn!("Faktory rejected {} jobs in batch", failed.len());
        }

        Ok(())
    }
}
