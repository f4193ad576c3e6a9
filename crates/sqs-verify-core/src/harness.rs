//! Drain-and-verify harness.
//!
//! Makes a scenario deterministic against a shared, possibly non-empty
//! queue: drain it, send known bodies, receive-and-delete until empty and
//! compare the bodies as sets. Delivery order is never asserted.
//!
//! Draining is the only isolation mechanism and assumes no other writer
//! touches the queue while a scenario runs.

use serde::Serialize;

use crate::config::HarnessConfig;
use crate::error::{AssertionFailure, HarnessError};
use crate::message::{
    BatchId, InboundMessage, MessageSet, OutboundMessage, QueueRef, MAX_BATCH_SIZE,
};
use crate::queue::MessageQueue;

/// How [`Harness::send_all`] submits bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// One `send` per body.
    #[default]
    Individual,
    /// `send_batch` in chunks of [`MAX_BATCH_SIZE`].
    Batched,
}

/// What a [`Harness::drain`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Receive rounds that returned at least one message
    pub rounds: usize,
    /// Messages deleted, counting redeliveries
    pub deleted: usize,
}

/// Bodies gathered by a [`Harness::collect`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Collected {
    /// Distinct bodies received
    pub bodies: MessageSet,
    /// Deliveries received, counting duplicates
    pub delivered: usize,
    /// Receive rounds that returned at least one message
    pub rounds: usize,
}

/// Outcome of a successful [`Harness::send_and_verify`].
///
/// Logged as JSON at debug level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Leftovers removed before sending
    pub drained: DrainReport,
    /// Bodies the service accepted
    pub sent: usize,
    /// Distinct bodies received, equal to the distinct bodies sent
    pub received: MessageSet,
    /// Deliveries received, counting duplicates
    pub delivered: usize,
    /// Deliveries beyond the number of sends
    pub duplicates: usize,
    /// Non-empty receive rounds of the collect phase. Reported only; it
    /// depends on how many messages the service hands out per call.
    pub rounds: usize,
}

/// Runs scenarios against one queue through a [`MessageQueue`].
pub struct Harness<Q> {
    queue: Q,
    queue_ref: QueueRef,
    config: HarnessConfig,
}

impl<Q: MessageQueue> Harness<Q> {
    /// Binds a harness to an existing queue.
    pub fn new(queue: Q, queue_ref: QueueRef, config: HarnessConfig) -> Self {
        Self {
            queue,
            queue_ref,
            config,
        }
    }

    /// Creates (or reuses) the named queue and binds a harness to it.
    pub async fn create(queue: Q, name: &str, config: HarnessConfig) -> Result<Self, HarnessError> {
        let queue_ref = queue.create_queue(name).await?;
        Ok(Self::new(queue, queue_ref, config))
    }

    /// The underlying client, for calls outside the harness flow.
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// The queue every scenario runs against.
    pub fn queue_ref(&self) -> &QueueRef {
        &self.queue_ref
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Receives and deletes until a receive comes back empty.
    ///
    /// Returns the number of non-empty rounds. A receive that still returns
    /// messages after `max_rounds` non-empty rounds is an assertion failure;
    /// those messages are left in flight.
    async fn poll_until_empty(
        &self,
        operation: &'static str,
        mut on_message: impl FnMut(InboundMessage) + Send,
    ) -> Result<usize, HarnessError> {
        let max_rounds = self.config.max_rounds.max(1);

        for round in 0..=max_rounds {
            let messages = self
                .queue
                .receive(
                    &self.queue_ref,
                    self.config.max_messages,
                    self.config.wait_time(),
                )
                .await?;

            if messages.is_empty() {
                return Ok(round);
            }
            if round == max_rounds {
                break;
            }

            for message in messages {
                self.queue
                    .delete(&self.queue_ref, &message.receipt_handle)
                    .await?;
                on_message(message);
            }
        }

        log::error!(
            "{operation} on {} still receiving after {max_rounds} rounds",
            self.queue_ref
        );
        Err(AssertionFailure::PollLimitExceeded {
            operation,
            rounds: max_rounds,
        }
        .into())
    }

    /// Empties the queue, discarding whatever it held.
    pub async fn drain(&self) -> Result<DrainReport, HarnessError> {
        let mut deleted = 0;
        let rounds = self.poll_until_empty("drain", |_| deleted += 1).await?;

        if deleted > 0 {
            log::info!("drained {deleted} leftover messages from {}", self.queue_ref);
        }
        Ok(DrainReport { rounds, deleted })
    }

    /// Empties the queue, accumulating the bodies it held.
    ///
    /// A body that arrives more than once counts once in
    /// [`Collected::bodies`] and every time in [`Collected::delivered`].
    pub async fn collect(&self) -> Result<Collected, HarnessError> {
        let mut bodies = MessageSet::new();
        let mut delivered = 0;

        let rounds = self
            .poll_until_empty("collect", |message| {
                delivered += 1;
                bodies.insert(message.body);
            })
            .await?;

        Ok(Collected {
            bodies,
            delivered,
            rounds,
        })
    }

    /// Sends every body and returns how many were accepted.
    ///
    /// In batched mode any entry the service refuses fails the call with
    /// [`AssertionFailure::BatchIncomplete`] once all chunks were submitted.
    pub async fn send_all<S>(&self, bodies: &[S], mode: SendMode) -> Result<usize, HarnessError>
    where
        S: AsRef<str> + Sync,
    {
        match mode {
            SendMode::Individual => {
                for body in bodies {
                    self.queue.send(&self.queue_ref, body.as_ref()).await?;
                }
                Ok(bodies.len())
            }
            SendMode::Batched => {
                let mut accepted = 0;
                let mut failed = Vec::new();

                for (chunk_index, chunk) in bodies.chunks(MAX_BATCH_SIZE).enumerate() {
                    let entries: Vec<OutboundMessage> = chunk
                        .iter()
                        .enumerate()
                        .map(|(i, body)| {
                            let id = BatchId::indexed("msg_", chunk_index * MAX_BATCH_SIZE + i);
                            OutboundMessage::new(body.as_ref()).with_id(id)
                        })
                        .collect();

                    let outcome = self.queue.send_batch(&self.queue_ref, &entries).await?;
                    accepted += outcome.successful.len();
                    failed.extend(outcome.failed);
                }

                if !failed.is_empty() {
                    return Err(AssertionFailure::BatchIncomplete { failed }.into());
                }
                Ok(accepted)
            }
        }
    }

    /// Drains, sends `bodies`, collects until empty and checks that the
    /// distinct received bodies equal the distinct sent ones.
    ///
    /// Duplicate deliveries are tolerated and reported. The number of
    /// receive rounds is reported but not asserted, since a service may
    /// return any number of messages per round.
    ///
    /// # Errors
    ///
    /// * [`HarnessError::Service`] - any call to the queue failed
    /// * [`HarnessError::Assertion`] - the sets differ, a batch entry was
    ///   refused, or a drain or collect hit `max_rounds`
    pub async fn send_and_verify<S>(
        &self,
        bodies: &[S],
        mode: SendMode,
    ) -> Result<VerifyReport, HarnessError>
    where
        S: AsRef<str> + Sync,
    {
        let expected: MessageSet = bodies.iter().map(|body| body.as_ref()).collect();

        let drained = self.drain().await?;
        let sent = self.send_all(bodies, mode).await?;
        let collected = self.collect().await?;

        expected.verify(&collected.bodies)?;

        let report = VerifyReport {
            drained,
            sent,
            duplicates: collected.delivered.saturating_sub(sent),
            delivered: collected.delivered,
            rounds: collected.rounds,
            received: collected.bodies,
        };

        if report.duplicates > 0 {
            log::warn!(
                "{} duplicate deliveries from {}",
                report.duplicates,
                self.queue_ref
            );
        }
        if log::log_enabled!(log::Level::Debug) {
            if let Ok(json) = serde_json::to_string(&report) {
                log::debug!("verified {}: {json}", self.queue_ref);
            }
        }

        Ok(report)
    }
}
