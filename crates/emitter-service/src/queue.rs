use anyhow::Result;
use emitter_types::MessageBatch;
use std::future::Future;
use thiserror::Error;

use crate::config::QueueConfig;

pub mod faktory_queue;
pub mod sqs_queue;

pub use self::faktory_queue::FaktoryQueue;
pub use self::sqs_queue::SqsQueue;

/// A queue rejected, or could not be reached for, a batch send.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("could not reach {backend} queue: {message}")]
    Connection {
        backend: &'static str,
        message: String,
    },
    #[error("{backend} queue rejected batch: {message}")]
    Service {
        backend: &'static str,
        message: String,
    },
}

/// Anything that can take a batch of messages in one call.
///
/// Implementations are cheap handles over a shared connection, so workers
/// each hold their own clone.
pub trait QueueClient: Clone + Send + Sync + 'static {
    fn send_batch(
        &self,
        batch: &MessageBatch,
    ) -> impl Future<Output = Result<(), SendError>> + Send;
}

/// The queue selected by configuration at startup.
#[derive(Clone)]
pub enum QueueBackend {
    Sqs(SqsQueue),
    Faktory(FaktoryQueue),
}

impl QueueBackend {
    pub async fn from_config(config: &QueueConfig) -> Result<Self> {
        let backend = match config {
            QueueConfig::Sqs { queue_url, region } => {
                QueueBackend::Sqs(SqsQueue::connect(queue_url.clone(), region.clone()).await)
            }
            QueueConfig::Faktory {
                url,
                queue,
                job_kind,
                pool_size,
            } => QueueBackend::Faktory(FaktoryQueue::connect(
                url,
                queue.clone(),
                job_kind.clone(),
                *pool_size,
            )?),
        };
        Ok(backend)
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueueBackend::Sqs(_) => sqs_queue::BACKEND,
            QueueBackend::Faktory(_) => faktory_queue::BACKEND,
        }
    }
}

impl QueueClient for QueueBackend {
    async fn send_batch(&self, batch: &MessageBatch) -> Result<(), SendError> {
        match self {
            QueueBackend::Sqs(queue) => queue.send_batch(batch).await,
            QueueBackend::Faktory(queue) => queue.send_batch(batch).await,
        }
    }
}
