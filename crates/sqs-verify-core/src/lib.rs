//! # sqs-verify-core
//!
//! A thin client facade over Amazon SQS and a drain-and-verify harness for
//! queue integration tests.
//!
//! ## Features
//!
//! - **Queue Facade**: [`MessageQueue`] covers create, send, batch send,
//!   receive and delete behind local types, so tests do not depend on SDK
//!   request and response shapes
//! - **SQS and In-Memory Backends**: [`SqsQueue`] talks to SQS or LocalStack,
//!   [`MemoryQueue`] runs in process
//! - **Drain and Verify**: [`Harness`] empties a queue, sends known bodies and
//!   asserts that exactly those bodies come back, ignoring order
//!
//! ## Example
//!
//! ```no_run
//! use sqs_verify::{ClientConfig, Harness, HarnessConfig, SendMode, SqsQueue};
//!
//! # async fn example() -> Result<(), sqs_verify::HarnessError> {
//! let queue = SqsQueue::connect(&ClientConfig::from_env()).await;
//! let harness = Harness::create(queue, "TestingTheQueue", HarnessConfig::default()).await?;
//!
//! let report = harness
//!     .send_and_verify(&["First Message", "Second Message"], SendMode::Individual)
//!     .await?;
//! println!("received {} distinct bodies", report.received.len());
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod harness;
mod memory;
mod message;
mod queue;
mod sqs;

pub use config::*;
pub use error::*;
pub use harness::*;
pub use memory::*;
pub use message::*;
pub use queue::MessageQueue;
pub use sqs::*;
