//! [`MessageQueue`] over Amazon SQS or any SQS-compatible endpoint.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs as sqs;
use sqs::types::SendMessageBatchRequestEntry;

use crate::config::ClientConfig;
use crate::error::ServiceError;
use crate::message::{
    BatchEntryFailure, BatchEntrySuccess, BatchOutcome, InboundMessage, OutboundMessage, QueueRef,
    ReceiptHandle, SendReceipt,
};
use crate::queue::{assign_batch_ids, check_body, clamp_max_messages, MessageQueue};

/// Longest long-poll wait SQS accepts, in seconds.
const MAX_WAIT_SECONDS: u64 = 20;

/// SQS client bound to one service endpoint.
///
/// # Example
///
/// ```no_run
/// use sqs_verify::{ClientConfig, MessageQueue, SqsQueue};
///
/// # async fn example() -> Result<(), sqs_verify::ServiceError> {
/// let queue = SqsQueue::connect(&ClientConfig::local("http://localhost:4566")).await;
/// let url = queue.create_queue("orders").await?;
/// queue.send(&url, "hello").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SqsQueue {
    /// The AWS SDK configuration used for SQS operations
    pub config: SdkConfig,
    /// The SQS client instance
    pub client: sqs::Client,
}

impl SqsQueue {
    /// Creates a queue client from a pre-built AWS SDK config.
    pub fn from_config(config: SdkConfig) -> Self {
        let client = sqs::Client::new(&config);
        Self { config, client }
    }

    /// Loads the SDK configuration described by `config` and builds a
    /// client from it.
    ///
    /// # Arguments
    ///
    /// * `config` - Endpoint, region and credentials to use; unset fields
    ///   fall back to the SDK's provider chains
    pub async fn connect(config: &ClientConfig) -> Self {
        Self::from_config(config.load().await)
    }
}

/// Whole seconds to long-poll for `wait`, rounded up and capped at the
/// service maximum.
fn wait_time_seconds(wait: Duration) -> i32 {
    let seconds = wait
        .as_secs()
        .saturating_add(u64::from(wait.subsec_nanos() > 0))
        .min(MAX_WAIT_SECONDS);
    // at most 20
    seconds as i32
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn create_queue(&self, name: &str) -> Result<QueueRef, ServiceError> {
        let output = self
            .client
            .create_queue()
            .queue_name(name)
            .send()
            .await
            .map_err(ServiceError::CreateQueue)?;

        let url = output.queue_url.ok_or(ServiceError::MissingField {
            operation: "CreateQueue",
            field: "QueueUrl",
        })?;
        log::debug!("created queue {name} at {url}");

        Ok(QueueRef::new(url))
    }

    async fn queue_url(&self, name: &str) -> Result<QueueRef, ServiceError> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(ServiceError::GetQueueUrl)?;

        let url = output.queue_url.ok_or(ServiceError::MissingField {
            operation: "GetQueueUrl",
            field: "QueueUrl",
        })?;

        Ok(QueueRef::new(url))
    }

    async fn delete_queue(&self, queue: &QueueRef) -> Result<(), ServiceError> {
        self.client
            .delete_queue()
            .queue_url(queue.as_str())
            .send()
            .await
            .map_err(ServiceError::DeleteQueue)?;

        log::debug!("deleted queue {queue}");
        Ok(())
    }

    async fn send(&self, queue: &QueueRef, body: &str) -> Result<SendReceipt, ServiceError> {
        check_body("SendMessage", body)?;

        let output = self
            .client
            .send_message()
            .queue_url(queue.as_str())
            .message_body(body)
            .send()
            .await
            .map_err(ServiceError::SendMessage)?;

        let message_id = output.message_id.ok_or(ServiceError::MissingField {
            operation: "SendMessage",
            field: "MessageId",
        })?;
        log::trace!("sent message {message_id} to {queue}");

        Ok(SendReceipt {
            message_id,
            md5_of_body: output.md5_of_message_body,
        })
    }

    async fn send_batch(
        &self,
        queue: &QueueRef,
        entries: &[OutboundMessage],
    ) -> Result<BatchOutcome, ServiceError> {
        let entries = assign_batch_ids(entries)?
            .into_iter()
            .map(|(id, body)| {
                SendMessageBatchRequestEntry::builder()
                    .id(id.as_str())
                    .message_body(body)
                    .build()
                    .map_err(|source| ServiceError::BuildRequest {
                        operation: "SendMessageBatch",
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .send_message_batch()
            .queue_url(queue.as_str())
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(ServiceError::SendMessageBatch)?;

        let outcome = BatchOutcome {
            successful: output
                .successful()
                .iter()
                .map(|entry| BatchEntrySuccess {
                    id: entry.id().to_string(),
                    message_id: entry.message_id().to_string(),
                })
                .collect(),
            failed: output
                .failed()
                .iter()
                .map(|entry| BatchEntryFailure {
                    id: entry.id().to_string(),
                    code: entry.code().to_string(),
                    message: entry.message().map(str::to_string),
                    sender_fault: entry.sender_fault(),
                })
                .collect(),
        };

        for failure in &outcome.failed {
            log::warn!(
                "batch entry {} rejected by {queue}: {} - {}",
                failure.id,
                failure.code,
                failure.message.as_deref().unwrap_or("unknown")
            );
        }
        log::debug!(
            "sent batch to {queue}: {} successful, {} failed",
            outcome.successful.len(),
            outcome.failed.len()
        );

        Ok(outcome)
    }

    async fn receive(
        &self,
        queue: &QueueRef,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<InboundMessage>, ServiceError> {
        let output = self
            .client
            .receive_message()
            .queue_url(queue.as_str())
            .max_number_of_messages(clamp_max_messages(max_messages))
            .wait_time_seconds(wait_time_seconds(wait))
            .send()
            .await
            .map_err(ServiceError::ReceiveMessage)?;

        // if none, nothing is visible right now
        let messages = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(InboundMessage::from_aws_message)
            .collect::<Result<Vec<_>, _>>()?;
        log::trace!("received {} messages from {queue}", messages.len());

        Ok(messages)
    }

    async fn delete(&self, queue: &QueueRef, receipt: &ReceiptHandle) -> Result<(), ServiceError> {
        self.client
            .delete_message()
            .queue_url(queue.as_str())
            .receipt_handle(receipt.as_str())
            .send()
            .await
            .map_err(ServiceError::DeleteMessage)?;

        Ok(())
    }
}
