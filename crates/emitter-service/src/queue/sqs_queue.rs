use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::SendMessageBatchRequestEntry;
use aws_sdk_sqs::Client;
use emitter_types::MessageBatch;
use tracing::{info, warn};

use super::{QueueClient, SendError};

pub const BACKEND: &str = "sqs";

/// Sends batches to an SQS queue with `SendMessageBatch`.
#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    /// Build a client from the ambient AWS credentials chain, pinned to `region`.
    pub async fn connect(queue_url: String, region: String) -> Self {
        info!("Creating SQS client for {} in {}", queue_url, region);

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        Self {
            client: Client::new(&sdk_config),
            queue_url,
        }
    }
}

fn request_entries(batch: &MessageBatch) -> Result<Vec<SendMessageBatchRequestEntry>, SendError> {
    batch
        .entries()
        .iter()
        .map(|entry| {
            SendMessageBatchRequestEntry::builder()
                .id(&entry.id)
                .message_body(&entry.body)
                .build()
                .map_err(|e| SendError::Service {
                    backend: BACKEND,
                    message: e.to_string(),
                })
        })
        .collect()
}

impl QueueClient for SqsQueue {
    async fn send_batch(&self, batch: &MessageBatch) -> Result<(), SendError> {
        let entries = request_entries(batch)?;

        let output = self
            .client
            .send_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| SendError::Service {
                backend: BACKEND,
                message: DisplayErrorContext(&e).to_string(),
            })?;

        // Individual entry failures are not tracked, only surfaced in the log.
        let failed = output.failed();
        if !failed.is_empty() {
            warn!(
                "SQS accepted batch with {} failed entries (first code: {})",
                failed.len(),
                failed[0].code()
            );
        }

        Ok(())
    }
}
