//! In-process FIFO queue.
//!
//! Stands in for SQS in tests and for `memory://` queue URLs. It keeps the
//! delivery rules the producer and consumer rely on:
//!
//! - messages of one message group are delivered in send order,
//! - a group is blocked while any of its messages is in flight,
//! - an unacknowledged message becomes visible again after the visibility
//!   timeout, with a fresh receipt handle,
//! - only the receipt handle of the current delivery deletes a message.
//!
//! Deduplication and long polling are not simulated. Time is read from the
//! tokio clock, so tests can pause and advance it.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

use super::{QueueTransport, MAX_BATCH_ENTRIES};
use crate::error::TransportError;
use crate::message::{
    BatchEntry, BatchEntryResult, Message, MessageAttributes, MessageId, ReceiveRequest,
    SendRequest,
};

/// Attribute name selecting every message attribute on receive.
const ALL_ATTRIBUTES: [&str; 2] = ["All", ".*"];

pub struct MemoryTransport {
    visibility_timeout: Duration,
    queue: Mutex<Vec<StoredMessage>>,
}

struct StoredMessage {
    id: MessageId,
    body: String,
    attributes: MessageAttributes,
    group_id: Option<String>,
    sequence_number: u64,
    sent_timestamp: i64,
    receive_count: u32,
    delivery: Option<Delivery>,
}

struct Delivery {
    receipt_handle: String,
    visible_at: Instant,
}

impl StoredMessage {
    fn is_in_flight(&self, now: Instant) -> bool {
        matches!(&self.delivery, Some(delivery) if delivery.visible_at > now)
    }

    fn to_message(&self, receipt_handle: String, attribute_names: &[String]) -> Message {
        let all = attribute_names
            .iter()
            .any(|name| ALL_ATTRIBUTES.contains(&name.as_str()));
        let attributes = self
            .attributes
            .iter()
            .filter(|(key, _)| all || attribute_names.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let mut system_attributes = MessageAttributes::from([
            (
                "ApproximateReceiveCount".to_string(),
                self.receive_count.to_string(),
            ),
            ("SentTimestamp".to_string(), self.sent_timestamp.to_string()),
            ("SequenceNumber".to_string(), self.sequence_number.to_string()),
        ]);
        if let Some(group_id) = &self.group_id {
            system_attributes.insert("MessageGroupId".to_string(), group_id.clone());
        }

        Message {
            id: self.id.clone(),
            body: self.body.clone(),
            receipt_handle,
            attributes,
            system_attributes,
        }
    }
}

impl MemoryTransport {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Messages not yet deleted, in flight or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredMessage>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(
        queue: &mut Vec<StoredMessage>,
        body: String,
        attributes: MessageAttributes,
        group_id: Option<String>,
    ) -> MessageId {
        let id = MessageId(Uuid::new_v4().to_string());
        let sequence_number = queue.last().map_or(1, |last| last.sequence_number + 1);
        queue.push(StoredMessage {
            id: id.clone(),
            body,
            attributes,
            group_id,
            sequence_number,
            sent_timestamp: chrono::Utc::now().timestamp_millis(),
            receive_count: 0,
            delivery: None,
        });
        id
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl QueueTransport for MemoryTransport {
    async fn send_message(&self, request: SendRequest) -> Result<MessageId, TransportError> {
        if request.body.is_empty() {
            return Err(TransportError::new(
                "SendMessage",
                "InvalidParameterValue: message body must not be empty",
            ));
        }

        let mut queue = self.lock();
        Ok(Self::enqueue(
            &mut queue,
            request.body,
            request.attributes,
            request.message_group_id,
        ))
    }

    async fn send_message_batch(
        &self,
        entries: Vec<BatchEntry>,
    ) -> Result<Vec<BatchEntryResult>, TransportError> {
        if entries.is_empty() {
            return Err(TransportError::new("SendMessageBatch", "EmptyBatchRequest"));
        }
        if entries.len() > MAX_BATCH_ENTRIES {
            return Err(TransportError::new(
                "SendMessageBatch",
                "TooManyEntriesInBatchRequest",
            ));
        }
        let distinct: HashSet<&str> = entries.iter().map(|entry| entry.id.as_str()).collect();
        if distinct.len() != entries.len() {
            return Err(TransportError::new("SendMessageBatch", "BatchEntryIdsNotDistinct"));
        }

        let mut queue = self.lock();
        Ok(entries
            .into_iter()
            .map(|entry| {
                if entry.body.is_empty() {
                    return BatchEntryResult::Failed {
                        id: entry.id,
                        code: "InvalidParameterValue".to_string(),
                        message: Some("message body must not be empty".to_string()),
                        sender_fault: true,
                    };
                }
                let message_id =
                    Self::enqueue(&mut queue, entry.body, entry.attributes, entry.message_group_id);
                BatchEntryResult::Sent {
                    id: entry.id,
                    message_id,
                }
            })
            .collect())
    }

    async fn receive_message(&self, request: ReceiveRequest) -> Result<Vec<Message>, TransportError> {
        let max_messages = usize::try_from(request.max_messages)
            .ok()
            .filter(|max| (1..=MAX_BATCH_ENTRIES).contains(max))
            .ok_or_else(|| {
                TransportError::new(
                    "ReceiveMessage",
                    format!(
                        "InvalidParameterValue: MaxNumberOfMessages must be between 1 and {MAX_BATCH_ENTRIES}"
                    ),
                )
            })?;

        let now = Instant::now();
        let mut queue = self.lock();
        let mut blocked_groups = HashSet::new();
        let mut messages = Vec::new();

        for stored in queue.iter_mut() {
            if messages.len() == max_messages {
                break;
            }
            if stored.is_in_flight(now) {
                if let Some(group_id) = &stored.group_id {
                    blocked_groups.insert(group_id.clone());
                }
                continue;
            }
            if stored
                .group_id
                .as_ref()
                .is_some_and(|group_id| blocked_groups.contains(group_id))
            {
                continue;
            }

            let receipt_handle = Uuid::new_v4().to_string();
            stored.receive_count += 1;
            stored.delivery = Some(Delivery {
                receipt_handle: receipt_handle.clone(),
                visible_at: now + self.visibility_timeout,
            });
            messages.push(stored.to_message(receipt_handle, &request.attribute_names));
        }

        Ok(messages)
    }

    async fn delete_message(&self, receipt_handle: &str) -> Result<(), TransportError> {
        let mut queue = self.lock();
        let position = queue.iter().position(|stored| {
            stored
                .delivery
                .as_ref()
                .is_some_and(|delivery| delivery.receipt_handle == receipt_handle)
        });

        match position {
            Some(position) => {
                queue.remove(position);
                Ok(())
            }
            None => Err(TransportError::new("DeleteMessage", "ReceiptHandleIsInvalid")),
        }
    }
}
