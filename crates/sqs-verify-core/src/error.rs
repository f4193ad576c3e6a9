//! Error taxonomy for queue operations and harness verification.
//!
//! Nothing here is retried or recovered: every error propagates to the
//! caller and, in the test suite, fails the scenario.

use aws_sdk_sqs::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::operation::{
    create_queue::CreateQueueError, delete_message::DeleteMessageError,
    delete_queue::DeleteQueueError, get_queue_url::GetQueueUrlError,
    receive_message::ReceiveMessageError, send_message::SendMessageError,
    send_message_batch::SendMessageBatchError,
};
use thiserror::Error;

use crate::message::BatchEntryFailure;

/// A failure reported by the remote service or its transport.
///
/// Covers authentication, throttling, malformed requests, stale receipt
/// handles and unreachable endpoints alike.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("create queue failed: {}", DisplayErrorContext(.0))]
    CreateQueue(SdkError<CreateQueueError>),

    #[error("queue url lookup failed: {}", DisplayErrorContext(.0))]
    GetQueueUrl(SdkError<GetQueueUrlError>),

    #[error("delete queue failed: {}", DisplayErrorContext(.0))]
    DeleteQueue(SdkError<DeleteQueueError>),

    #[error("send message failed: {}", DisplayErrorContext(.0))]
    SendMessage(SdkError<SendMessageError>),

    #[error("send message batch failed: {}", DisplayErrorContext(.0))]
    SendMessageBatch(SdkError<SendMessageBatchError>),

    #[error("receive message failed: {}", DisplayErrorContext(.0))]
    ReceiveMessage(SdkError<ReceiveMessageError>),

    #[error("delete message failed: {}", DisplayErrorContext(.0))]
    DeleteMessage(SdkError<DeleteMessageError>),

    /// An error code without an SDK error value behind it, as raised by the
    /// in-memory queue and by the empty-body check on sends.
    #[error("{operation} rejected: {code}: {message}")]
    Rejected {
        operation: &'static str,
        code: String,
        message: String,
    },

    #[error("failed to build {operation} request: {source}")]
    BuildRequest {
        operation: &'static str,
        #[source]
        source: BuildError,
    },

    #[error("{operation} response is missing `{field}`")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
}

impl ServiceError {
    /// The service-assigned error code, e.g. `ReceiptHandleIsInvalid`.
    ///
    /// Transport failures (timeouts, dispatch errors) carry no code.
    pub fn code(&self) -> Option<&str> {
        match self {
            ServiceError::CreateQueue(e) => e.code(),
            ServiceError::GetQueueUrl(e) => e.code(),
            ServiceError::DeleteQueue(e) => e.code(),
            ServiceError::SendMessage(e) => e.code(),
            ServiceError::SendMessageBatch(e) => e.code(),
            ServiceError::ReceiveMessage(e) => e.code(),
            ServiceError::DeleteMessage(e) => e.code(),
            ServiceError::Rejected { code, .. } => Some(code.as_str()),
            ServiceError::BuildRequest { .. } | ServiceError::MissingField { .. } => None,
        }
    }

    pub(crate) fn rejected(operation: &'static str, code: &str, message: &str) -> Self {
        ServiceError::Rejected {
            operation,
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// A batch entry id outside the characters and length SQS accepts.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid batch id: {0}")]
pub struct InvalidBatchId(pub String);

/// Expected and actual state disagree. Always surfaced, never suppressed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssertionFailure {
    #[error("received bodies differ from sent bodies (missing: {missing:?}, unexpected: {unexpected:?})")]
    SetMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("{operation} still received messages after {rounds} non-empty receive rounds")]
    PollLimitExceeded {
        operation: &'static str,
        rounds: usize,
    },

    #[error("{} batch entries were not accepted: {failed:?}", .failed.len())]
    BatchIncomplete { failed: Vec<BatchEntryFailure> },
}

/// Error type of the drain-and-verify harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("assertion failed: {0}")]
    Assertion(#[from] AssertionFailure),
}
