//! Messages exchanged with the queue transport.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trace_context::TraceContext;

/// Message attributes. Every value is a `String`-typed attribute.
pub type MessageAttributes = HashMap<String, String>;

/// Identifier assigned by the transport when a message is sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A delivered message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub body: String,
    /// Valid for this delivery only; required to delete the message.
    pub receipt_handle: String,
    /// User attributes that were requested on receive.
    pub attributes: MessageAttributes,
    /// Transport metadata such as `ApproximateReceiveCount`.
    pub system_attributes: HashMap<String, String>,
}

/// Body produced by the scheduled send job.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Payload {
    pub id: Uuid,
    pub content: String,
    pub timestamp: String,
}

impl Payload {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            content: format!("message-{id}"),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub body: String,
    pub attributes: MessageAttributes,
    pub message_group_id: Option<String>,
    pub deduplication_id: Option<String>,
}

/// One entry of a `SendMessageBatch` call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    /// Caller-chosen id, unique within the batch.
    pub id: String,
    pub body: String,
    pub attributes: MessageAttributes,
    pub message_group_id: Option<String>,
    pub deduplication_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEntryResult {
    Sent {
        id: String,
        message_id: MessageId,
    },
    Failed {
        id: String,
        code: String,
        message: Option<String>,
        sender_fault: bool,
    },
}

impl BatchEntryResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, BatchEntryResult::Sent { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveRequest {
    pub max_messages: i32,
    /// Message attributes to include in the response. Attributes are opt-in:
    /// names not listed here are not returned.
    pub attribute_names: Vec<String>,
    pub wait_time_seconds: i32,
}

/// What happened to one received message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Business logic succeeded and the message was deleted.
    Acknowledged,
    /// Business logic failed; the message was left for redelivery.
    Failed(String),
    /// Not processed because an earlier message of the batch failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedResult {
    pub message: Message,
    /// Trace context propagated by the producer, if the message carried one.
    pub trace_context: Option<TraceContext>,
    pub outcome: Outcome,
}

impl ProcessedResult {
    pub fn is_acknowledged(&self) -> bool {
        self.outcome == Outcome::Acknowledged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_content_names_its_id() {
        let payload = Payload::new();

        assert_eq!(payload.content, format!("message-{}", payload.id));
        assert!(chrono::DateTime::parse_from_rfc3339(&payload.timestamp).is_ok());
    }
}
