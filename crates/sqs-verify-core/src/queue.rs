//! The queue client facade.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::message::{
    BatchId, BatchOutcome, InboundMessage, OutboundMessage, QueueRef, ReceiptHandle, SendReceipt,
    MAX_RECEIVE_MESSAGES,
};

/// Operations against a message-queue service.
///
/// Every call is a remote round trip with no local caching, and each may be
/// retried independently by the caller. Sends are not idempotent: the
/// service does not deduplicate plain sends, so retrying a `send` or
/// `send_batch` that failed after reaching the service can enqueue the same
/// body twice. Consumers must tolerate duplicate deliveries.
///
/// Every failure is a [`ServiceError`]. Apart from empty bodies nothing is
/// validated locally: invalid queue names, empty or oversized batches and
/// repeated entry ids are left for the service to reject.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Creates a queue, or returns the existing one when the service treats
    /// the call as idempotent.
    async fn create_queue(&self, name: &str) -> Result<QueueRef, ServiceError>;

    /// Resolves an existing queue by name.
    async fn queue_url(&self, name: &str) -> Result<QueueRef, ServiceError>;

    /// Deletes the queue and every message in it.
    ///
    /// # Errors
    ///
    /// Fails when the queue does not exist or the service refuses the call.
    async fn delete_queue(&self, queue: &QueueRef) -> Result<(), ServiceError>;

    /// Submits one message. Only an empty body is rejected locally.
    async fn send(&self, queue: &QueueRef, body: &str) -> Result<SendReceipt, ServiceError>;

    /// Submits up to [`MAX_BATCH_SIZE`](crate::MAX_BATCH_SIZE) messages in one call.
    ///
    /// Entries without an id are sent under their position in `entries`.
    ///
    /// Entries the service refuses are listed in [`BatchOutcome::failed`];
    /// a call that returns `Ok` may still have partially failed.
    async fn send_batch(
        &self,
        queue: &QueueRef,
        entries: &[OutboundMessage],
    ) -> Result<BatchOutcome, ServiceError>;

    /// Returns the messages currently visible, possibly none.
    ///
    /// An empty vector means nothing is available right now; it is not an
    /// error. `max_messages` is clamped to `1..=10`.
    async fn receive(
        &self,
        queue: &QueueRef,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<InboundMessage>, ServiceError>;

    /// Deletes a delivered message. Fails with a service error when the
    /// handle is stale or malformed.
    async fn delete(&self, queue: &QueueRef, receipt: &ReceiptHandle) -> Result<(), ServiceError>;
}

/// Error code SQS returns when a required parameter is missing or empty.
pub(crate) const MISSING_PARAMETER: &str = "MissingParameter";

pub(crate) fn check_body(operation: &'static str, body: &str) -> Result<(), ServiceError> {
    if body.is_empty() {
        return Err(ServiceError::rejected(
            operation,
            MISSING_PARAMETER,
            "message body must not be empty",
        ));
    }
    Ok(())
}

pub(crate) fn clamp_max_messages(max_messages: i32) -> i32 {
    max_messages.clamp(1, MAX_RECEIVE_MESSAGES)
}

/// Pairs every body with its entry id, falling back to the position.
pub(crate) fn assign_batch_ids(
    entries: &[OutboundMessage],
) -> Result<Vec<(BatchId, &str)>, ServiceError> {
    entries
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            check_body("SendMessageBatch", &entry.body)?;
            let id = match &entry.id {
                Some(id) => id.clone(),
                None => BatchId::indexed("", position),
            };
            Ok((id, entry.body.as_str()))
        })
        .collect()
}
