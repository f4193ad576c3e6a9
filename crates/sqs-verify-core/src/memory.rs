//! In-process [`MessageQueue`] with SQS-like delivery semantics.
//!
//! Used to exercise the harness without a running service:
//! - received messages stay invisible for a visibility timeout and are then
//!   redelivered under a new receipt handle
//! - a receipt handle is valid for exactly one delete
//! - bodies over 256 KiB are refused, per entry in batches
//! - receives can be capped below the requested count to model services
//!   that hand out one message per call
//! - every call is counted so tests can assert on traffic

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::message::{
    BatchEntryFailure, BatchEntrySuccess, BatchOutcome, InboundMessage, OutboundMessage, QueueRef,
    ReceiptHandle, SendReceipt, MAX_BATCH_SIZE,
};
use crate::queue::{assign_batch_ids, check_body, clamp_max_messages, MessageQueue};

/// Largest body SQS accepts, in bytes.
pub const MAX_BODY_BYTES: usize = 262_144;

const URL_PREFIX: &str = "memory://000000000000/";
const NON_EXISTENT_QUEUE: &str = "AWS.SimpleQueueService.NonExistentQueue";
const INVALID_RECEIPT: &str = "ReceiptHandleIsInvalid";
const INVALID_PARAMETER: &str = "InvalidParameterValue";
const EMPTY_BATCH: &str = "AWS.SimpleQueueService.EmptyBatchRequest";
const TOO_MANY_ENTRIES: &str = "AWS.SimpleQueueService.TooManyEntriesInBatchRequest";
const IDS_NOT_DISTINCT: &str = "AWS.SimpleQueueService.BatchEntryIdsNotDistinct";

struct StoredMessage {
    message_id: String,
    body: String,
    /// Current receipt handle and the instant the message becomes visible
    /// again.
    in_flight: Option<(String, Instant)>,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        match &self.in_flight {
            None => true,
            Some((_, visible_at)) => *visible_at <= now,
        }
    }
}

#[derive(Default)]
struct QueueState {
    messages: Vec<StoredMessage>,
}

/// Number of calls issued per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub send: usize,
    pub send_batch: usize,
    pub receive: usize,
    pub delete: usize,
}

#[derive(Default)]
struct Counters {
    send: AtomicUsize,
    send_batch: AtomicUsize,
    receive: AtomicUsize,
    delete: AtomicUsize,
}

/// A set of named queues held in process memory.
///
/// Rejections carry the error codes SQS uses, as
/// [`ServiceError::Rejected`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sqs_verify::{MemoryQueue, MessageQueue};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), sqs_verify::ServiceError> {
/// let memory = MemoryQueue::new().with_receive_limit(1);
/// let url = memory.create_queue("orders").await?;
/// memory.send(&url, "hello").await?;
///
/// let received = memory.receive(&url, 10, Duration::ZERO).await?;
/// memory.delete(&url, &received[0].receipt_handle).await?;
/// assert_eq!(memory.depth(&url), 0);
/// # Ok(())
/// # }
/// ```
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    visibility_timeout: Duration,
    receive_limit: Option<usize>,
    counters: Counters,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    /// An empty instance with a 30 second visibility timeout and no receive
    /// cap.
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            visibility_timeout: Duration::from_secs(30),
            receive_limit: None,
            counters: Counters::default(),
        }
    }

    /// How long a received message stays hidden before it is redelivered.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Caps every receive at `limit` messages regardless of the request.
    pub fn with_receive_limit(mut self, limit: usize) -> Self {
        self.receive_limit = Some(limit.max(1));
        self
    }

    /// Message operations issued so far.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            send: self.counters.send.load(Ordering::Relaxed),
            send_batch: self.counters.send_batch.load(Ordering::Relaxed),
            receive: self.counters.receive.load(Ordering::Relaxed),
            delete: self.counters.delete.load(Ordering::Relaxed),
        }
    }

    /// Messages stored in the queue, in flight or not.
    pub fn depth(&self, queue: &QueueRef) -> usize {
        self.lock()
            .get(queue.as_str())
            .map_or(0, |state| state.messages.len())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_queue<T>(
        &self,
        operation: &'static str,
        queue: &QueueRef,
        f: impl FnOnce(&mut QueueState) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut queues = self.lock();
        let state = queues.get_mut(queue.as_str()).ok_or_else(|| {
            ServiceError::rejected(
                operation,
                NON_EXISTENT_QUEUE,
                "the specified queue does not exist",
            )
        })?;
        f(state)
    }
}

/// Batch rules SQS enforces on the request as a whole.
fn check_batch(entries: &[OutboundMessage]) -> Result<(), ServiceError> {
    const OPERATION: &str = "SendMessageBatch";

    if entries.is_empty() {
        return Err(ServiceError::rejected(
            OPERATION,
            EMPTY_BATCH,
            "there should be at least one entry",
        ));
    }
    if entries.len() > MAX_BATCH_SIZE {
        return Err(ServiceError::rejected(
            OPERATION,
            TOO_MANY_ENTRIES,
            &format!("maximum number of entries per request is {MAX_BATCH_SIZE}"),
        ));
    }
    Ok(())
}

fn enqueue(state: &mut QueueState, body: &str) -> String {
    let message_id = uuid::Uuid::new_v4().to_string();
    state.messages.push(StoredMessage {
        message_id: message_id.clone(),
        body: body.to_string(),
        in_flight: None,
    });
    message_id
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn create_queue(&self, name: &str) -> Result<QueueRef, ServiceError> {
        if name.is_empty()
            || name.len() > 80
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ServiceError::rejected(
                "CreateQueue",
                INVALID_PARAMETER,
                "queue names may only contain alphanumeric characters, hyphens and underscores",
            ));
        }

        let url = format!("{URL_PREFIX}{name}");
        self.lock().entry(url.clone()).or_default();
        Ok(QueueRef::new(url))
    }

    async fn queue_url(&self, name: &str) -> Result<QueueRef, ServiceError> {
        let url = format!("{URL_PREFIX}{name}");
        if !self.lock().contains_key(&url) {
            return Err(ServiceError::rejected(
                "GetQueueUrl",
                NON_EXISTENT_QUEUE,
                "the specified queue does not exist",
            ));
        }
        Ok(QueueRef::new(url))
    }

    async fn delete_queue(&self, queue: &QueueRef) -> Result<(), ServiceError> {
        match self.lock().remove(queue.as_str()) {
            Some(_) => Ok(()),
            None => Err(ServiceError::rejected(
                "DeleteQueue",
                NON_EXISTENT_QUEUE,
                "the specified queue does not exist",
            )),
        }
    }

    async fn send(&self, queue: &QueueRef, body: &str) -> Result<SendReceipt, ServiceError> {
        self.counters.send.fetch_add(1, Ordering::Relaxed);
        check_body("SendMessage", body)?;

        self.with_queue("SendMessage", queue, |state| {
            if body.len() > MAX_BODY_BYTES {
                return Err(ServiceError::rejected(
                    "SendMessage",
                    INVALID_PARAMETER,
                    "message body exceeds the maximum size",
                ));
            }
            Ok(SendReceipt {
                message_id: enqueue(state, body),
                md5_of_body: None,
            })
        })
    }

    async fn send_batch(
        &self,
        queue: &QueueRef,
        entries: &[OutboundMessage],
    ) -> Result<BatchOutcome, ServiceError> {
        self.counters.send_batch.fetch_add(1, Ordering::Relaxed);
        check_batch(entries)?;
        let prepared = assign_batch_ids(entries)?;

        let mut seen = HashSet::with_capacity(prepared.len());
        for (id, _) in &prepared {
            if !seen.insert(id.as_str()) {
                return Err(ServiceError::rejected(
                    "SendMessageBatch",
                    IDS_NOT_DISTINCT,
                    &format!("id {id} repeated"),
                ));
            }
        }

        self.with_queue("SendMessageBatch", queue, |state| {
            let mut outcome = BatchOutcome::default();
            for (id, body) in prepared {
                if body.len() > MAX_BODY_BYTES {
                    outcome.failed.push(BatchEntryFailure {
                        id: id.to_string(),
                        code: INVALID_PARAMETER.to_string(),
                        message: Some("message body exceeds the maximum size".to_string()),
                        sender_fault: true,
                    });
                    continue;
                }
                outcome.successful.push(BatchEntrySuccess {
                    id: id.to_string(),
                    message_id: enqueue(state, body),
                });
            }
            Ok(outcome)
        })
    }

    async fn receive(
        &self,
        queue: &QueueRef,
        max_messages: i32,
        _wait: Duration,
    ) -> Result<Vec<InboundMessage>, ServiceError> {
        self.counters.receive.fetch_add(1, Ordering::Relaxed);

        let mut limit = usize::try_from(clamp_max_messages(max_messages)).unwrap_or(1);
        if let Some(cap) = self.receive_limit {
            limit = limit.min(cap);
        }
        let visibility_timeout = self.visibility_timeout;

        self.with_queue("ReceiveMessage", queue, |state| {
            let now = Instant::now();
            let delivered: Vec<InboundMessage> = state
                .messages
                .iter_mut()
                .filter(|message| message.is_visible(now))
                .take(limit)
                .map(|message| {
                    // a redelivery invalidates the previous handle
                    let handle = uuid::Uuid::new_v4().simple().to_string();
                    message.in_flight = Some((handle.clone(), now + visibility_timeout));
                    InboundMessage {
                        message_id: Some(message.message_id.clone()),
                        receipt_handle: ReceiptHandle::new(handle),
                        md5_of_body: None,
                        body: message.body.clone(),
                    }
                })
                .collect();
            Ok(delivered)
        })
    }

    async fn delete(&self, queue: &QueueRef, receipt: &ReceiptHandle) -> Result<(), ServiceError> {
        self.counters.delete.fetch_add(1, Ordering::Relaxed);

        self.with_queue("DeleteMessage", queue, |state| {
            let position = state.messages.iter().position(|message| {
                matches!(&message.in_flight, Some((handle, _)) if handle == receipt.as_str())
            });
            match position {
                Some(position) => {
                    state.messages.remove(position);
                    Ok(())
                }
                None => Err(ServiceError::rejected(
                    "DeleteMessage",
                    INVALID_RECEIPT,
                    "the receipt handle is not valid for any in-flight message",
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::BatchId;

    const NO_WAIT: Duration = Duration::ZERO;

    async fn queue_with(bodies: &[&str]) -> (MemoryQueue, QueueRef) {
        let memory = MemoryQueue::new();
        let url = memory.create_queue("test-queue").await.unwrap();
        for body in bodies {
            memory.send(&url, body).await.unwrap();
        }
        (memory, url)
    }

    #[tokio::test]
    async fn create_queue_is_idempotent() {
        let memory = MemoryQueue::new();
        let first = memory.create_queue("TestingQueue123").await.unwrap();
        let second = memory.create_queue("TestingQueue123").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(memory.queue_url("TestingQueue123").await.unwrap(), first);
    }

    #[tokio::test]
    async fn create_queue_rejects_invalid_names() {
        let memory = MemoryQueue::new();
        let too_long = "q".repeat(81);
        for name in ["", "not a name", too_long.as_str()] {
            let err = memory.create_queue(name).await.unwrap_err();
            assert_eq!(err.code(), Some(INVALID_PARAMETER), "name {name:?}");
        }
    }

    #[tokio::test]
    async fn batch_request_rules_are_service_errors() {
        let (memory, url) = queue_with(&[]).await;
        let eleven: Vec<_> = (0..11).map(|i| OutboundMessage::new(format!("m{i}"))).collect();
        let id = BatchId::new("x").unwrap();
        let repeated = vec![
            OutboundMessage::new("a").with_id(id.clone()),
            OutboundMessage::new("b").with_id(id),
        ];
        // an explicit id may collide with a positional one
        let collides = vec![
            OutboundMessage::new("a"),
            OutboundMessage::new("b").with_id(BatchId::new("0").unwrap()),
        ];

        let cases: [(&[OutboundMessage], &str); 4] = [
            (&[], EMPTY_BATCH),
            (eleven.as_slice(), TOO_MANY_ENTRIES),
            (repeated.as_slice(), IDS_NOT_DISTINCT),
            (collides.as_slice(), IDS_NOT_DISTINCT),
        ];
        for (entries, code) in cases {
            let err = memory.send_batch(&url, entries).await.unwrap_err();
            assert_eq!(err.code(), Some(code));
        }
        assert_eq!(memory.depth(&url), 0);
    }

    #[tokio::test]
    async fn empty_body_is_a_service_error() {
        let (memory, url) = queue_with(&[]).await;

        let err = memory.send(&url, "").await.unwrap_err();
        assert_eq!(err.code(), Some(crate::queue::MISSING_PARAMETER));
    }

    #[tokio::test]
    async fn unknown_queue_is_a_service_error() {
        let memory = MemoryQueue::new();
        let url = QueueRef::new("memory://000000000000/missing");

        let err = memory.send(&url, "body").await.unwrap_err();
        assert_eq!(err.code(), Some(NON_EXISTENT_QUEUE));
        let err = memory.queue_url("missing").await.unwrap_err();
        assert_eq!(err.code(), Some(NON_EXISTENT_QUEUE));
    }

    #[tokio::test]
    async fn receive_from_empty_queue_is_empty() {
        let (memory, url) = queue_with(&[]).await;
        assert!(memory.receive(&url, 10, NO_WAIT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn received_messages_are_hidden_until_deleted() {
        let (memory, url) = queue_with(&["one"]).await;

        let received = memory.receive(&url, 10, NO_WAIT).await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(memory.receive(&url, 10, NO_WAIT).await.unwrap().is_empty());
        assert_eq!(memory.depth(&url), 1);

        memory.delete(&url, &received[0].receipt_handle).await.unwrap();
        assert_eq!(memory.depth(&url), 0);
    }

    #[tokio::test]
    async fn receipt_handle_is_single_use() {
        let (memory, url) = queue_with(&["once"]).await;
        let received = memory.receive(&url, 1, NO_WAIT).await.unwrap();
        let handle = &received[0].receipt_handle;

        memory.delete(&url, handle).await.unwrap();
        let err = memory.delete(&url, handle).await.unwrap_err();

        assert_eq!(err.code(), Some(INVALID_RECEIPT));
    }

    #[tokio::test]
    async fn expired_visibility_redelivers_with_new_handle() {
        let memory = MemoryQueue::new().with_visibility_timeout(Duration::ZERO);
        let url = memory.create_queue("redelivery").await.unwrap();
        memory.send(&url, "again").await.unwrap();

        let first = memory.receive(&url, 1, NO_WAIT).await.unwrap();
        let second = memory.receive(&url, 1, NO_WAIT).await.unwrap();

        assert_eq!(second[0].body, "again");
        assert_ne!(first[0].receipt_handle, second[0].receipt_handle);
        let err = memory
            .delete(&url, &first[0].receipt_handle)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(INVALID_RECEIPT));
        memory.delete(&url, &second[0].receipt_handle).await.unwrap();
    }

    #[tokio::test]
    async fn receive_limit_caps_delivery() {
        let memory = MemoryQueue::new().with_receive_limit(1);
        let url = memory.create_queue("one-at-a-time").await.unwrap();
        for body in ["a", "b", "c"] {
            memory.send(&url, body).await.unwrap();
        }

        assert_eq!(memory.receive(&url, 10, NO_WAIT).await.unwrap().len(), 1);
        assert_eq!(memory.receive(&url, 10, NO_WAIT).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_reports_oversized_entries() {
        let (memory, url) = queue_with(&[]).await;
        let oversized = "x".repeat(MAX_BODY_BYTES + 1);
        let entries = vec![OutboundMessage::new("fits"), OutboundMessage::new(oversized)];

        let outcome = memory.send_batch(&url, &entries).await.unwrap();

        assert!(!outcome.is_complete());
        assert_eq!(outcome.successful.len(), 1);
        assert_eq!(outcome.successful[0].id, "0");
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].id, "1");
        assert!(outcome.failed[0].sender_fault);
        assert_eq!(memory.depth(&url), 1);
    }

    #[tokio::test]
    async fn counts_calls() {
        let (memory, url) = queue_with(&["a"]).await;
        let received = memory.receive(&url, 10, NO_WAIT).await.unwrap();
        memory.delete(&url, &received[0].receipt_handle).await.unwrap();

        assert_eq!(
            memory.calls(),
            CallCounts {
                send: 1,
                send_batch: 0,
                receive: 1,
                delete: 1,
            }
        );
    }

    #[tokio::test]
    async fn delete_queue_removes_it() {
        let (memory, url) = queue_with(&["a"]).await;
        memory.delete_queue(&url).await.unwrap();

        let err = memory.receive(&url, 1, NO_WAIT).await.unwrap_err();
        assert_eq!(err.code(), Some(NON_EXISTENT_QUEUE));
    }
}
