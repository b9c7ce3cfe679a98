//! The queue transport: the managed message queue the producer and consumer
//! talk to.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::message::{BatchEntry, BatchEntryResult, Message, MessageId, ReceiveRequest, SendRequest};

pub mod memory;
pub mod sqs;

pub use memory::MemoryTransport;
pub use sqs::SqsTransport;

/// Most entries a single `SendMessageBatch` call accepts.
pub const MAX_BATCH_ENTRIES: usize = 10;

/// Operations of a FIFO, at-least-once message queue.
///
/// Ordering, visibility timeouts and deduplication belong to the
/// implementation. Errors are returned as they occurred, never retried.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    async fn send_message(&self, request: SendRequest) -> Result<MessageId, TransportError>;

    /// Sends up to [`MAX_BATCH_ENTRIES`] messages. Entry failures are part of
    /// the result; only a failure of the whole call is an error.
    async fn send_message_batch(
        &self,
        entries: Vec<BatchEntry>,
    ) -> Result<Vec<BatchEntryResult>, TransportError>;

    async fn receive_message(&self, request: ReceiveRequest) -> Result<Vec<Message>, TransportError>;

    async fn delete_message(&self, receipt_handle: &str) -> Result<(), TransportError>;
}
