//! Queue references and the outbound/inbound message types exchanged with
//! the service.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AssertionFailure, InvalidBatchId, ServiceError};

/// Maximum number of entries SQS accepts in one `SendMessageBatch` call.
pub const MAX_BATCH_SIZE: usize = 10;

/// Maximum number of messages SQS returns from one `ReceiveMessage` call.
pub const MAX_RECEIVE_MESSAGES: i32 = 10;

/// Opaque address of one queue, in practice its URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueRef(String);

impl QueueRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueueRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Client-assigned identifier of a batch entry.
///
/// Must be unique within its batch and is used to correlate per-entry
/// results. SQS allows 1 to 80 characters drawn from ASCII letters,
/// digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BatchId(String);

impl BatchId {
    /// Validates `id` against the SQS rules.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidBatchId`] for an empty id, one longer than 80
    /// characters, or one with a character outside the allowed set.
    pub fn new<S: Into<String>>(id: S) -> Result<Self, InvalidBatchId> {
        let id = id.into();
        if id.is_empty() {
            return Err(InvalidBatchId(
                "batch id cannot be empty".to_string(),
            ));
        }
        if id.len() > 80 {
            return Err(InvalidBatchId(format!(
                "batch id exceeds maximum length: {} > 80 characters",
                id.len()
            )));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
        {
            return Err(InvalidBatchId(format!(
                "invalid character '{c}' in `{id}`; allowed: ASCII alphanumeric, '-', '_'"
            )));
        }
        Ok(Self(id))
    }

    /// `prefix` followed by `position`. The prefix must itself be a valid
    /// id fragment.
    pub(crate) fn indexed(prefix: &str, position: usize) -> Self {
        Self(format!("{prefix}{position}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BatchId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BatchId {
    type Error = InvalidBatchId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BatchId::new(value)
    }
}

impl From<BatchId> for String {
    fn from(value: BatchId) -> Self {
        value.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message about to be submitted.
///
/// The id only matters for batch submission; entries sent without one get
/// their position in the batch as id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub id: Option<BatchId>,
    pub body: String,
}

impl OutboundMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            id: None,
            body: body.into(),
        }
    }

    pub fn with_id(mut self, id: BatchId) -> Self {
        self.id = Some(id);
        self
    }
}

/// One-time handle for deleting a specific delivery of a message.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Handles are long opaque blobs; keep debug output readable.
impl fmt::Debug for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(12).collect();
        write!(f, "ReceiptHandle({prefix}..)")
    }
}

/// A message as delivered by the service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InboundMessage {
    /// Identifier assigned by the service
    pub message_id: Option<String>,
    /// Handle used to delete this delivery
    pub receipt_handle: ReceiptHandle,
    /// MD5 digest of the body, when the service reports one
    pub md5_of_body: Option<String>,
    pub body: String,
}

impl InboundMessage {
    /// Converts an SDK message, rejecting deliveries without a receipt
    /// handle or body.
    pub fn from_aws_message(message: aws_sdk_sqs::types::Message) -> Result<Self, ServiceError> {
        let receipt_handle = message.receipt_handle.ok_or(ServiceError::MissingField {
            operation: "ReceiveMessage",
            field: "ReceiptHandle",
        })?;
        let body = message.body.ok_or(ServiceError::MissingField {
            operation: "ReceiveMessage",
            field: "Body",
        })?;

        Ok(Self {
            message_id: message.message_id,
            receipt_handle: ReceiptHandle::new(receipt_handle),
            md5_of_body: message.md5_of_body,
            body,
        })
    }
}

/// Confirmation of a single accepted send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub message_id: String,
    pub md5_of_body: Option<String>,
}

/// A batch entry the service accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchEntrySuccess {
    pub id: String,
    pub message_id: String,
}

/// A batch entry the service refused, with its error code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchEntryFailure {
    pub id: String,
    pub code: String,
    pub message: Option<String>,
    /// Whether the service blames the request rather than itself
    pub sender_fault: bool,
}

/// Per-entry result of a batch send.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub successful: Vec<BatchEntrySuccess>,
    pub failed: Vec<BatchEntryFailure>,
}

impl BatchOutcome {
    /// True when no entry failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Unordered set of distinct message bodies.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MessageSet(BTreeSet<String>);

impl MessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the body was already present.
    pub fn insert(&mut self, body: impl Into<String>) -> bool {
        self.0.insert(body.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, body: &str) -> bool {
        self.0.contains(body)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Checks that `received` holds exactly the bodies of `self`.
    pub fn verify(&self, received: &MessageSet) -> Result<(), AssertionFailure> {
        let missing: Vec<String> = self.0.difference(&received.0).cloned().collect();
        let unexpected: Vec<String> = received.0.difference(&self.0).cloned().collect();

        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(AssertionFailure::SetMismatch {
                missing,
                unexpected,
            })
        }
    }
}

impl<S: Into<String>> FromIterator<S> for MessageSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
