//! Sends messages carrying the current trace context.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SubmissionMode;
use crate::error::TransportError;
use crate::mdc;
use crate::message::{BatchEntry, BatchEntryResult, MessageAttributes, MessageId, SendRequest};
use crate::trace_context::TraceContext;
use crate::transport::{QueueTransport, MAX_BATCH_ENTRIES};

/// Message group assignment of [`Producer::send_batch`] entries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BatchGrouping {
    /// Every entry goes to the producer's message group.
    #[default]
    Shared,
    /// Batch `k` goes to `{group}-{k}`, batch 0 to the group itself, so
    /// consumers can work on different batches in parallel while each batch
    /// stays ordered.
    PerBatch,
}

pub struct Producer<T> {
    transport: Arc<T>,
    message_group_id: Option<String>,
    mode: SubmissionMode,
    batch_grouping: BatchGrouping,
}

impl<T> Producer<T>
where
    T: QueueTransport + 'static,
{
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            message_group_id: None,
            mode: SubmissionMode::Blocking,
            batch_grouping: BatchGrouping::Shared,
        }
    }

    /// Messages are sent to this FIFO message group, each with a fresh
    /// deduplication id.
    pub fn with_message_group_id(mut self, message_group_id: impl Into<String>) -> Self {
        self.message_group_id = Some(message_group_id.into());
        self
    }

    pub fn with_mode(mut self, mode: SubmissionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_batch_grouping(mut self, batch_grouping: BatchGrouping) -> Self {
        self.batch_grouping = batch_grouping;
        self
    }

    /// Sends `body` with the trace context of the current span.
    ///
    /// Without an active span the message goes out without trace attributes.
    pub async fn send(&self, body: impl Into<String>) -> Result<MessageId, TransportError> {
        self.send_with_context(body.into(), TraceContext::current().as_ref())
            .await
    }

    pub async fn send_with_context(
        &self,
        body: String,
        trace_context: Option<&TraceContext>,
    ) -> Result<MessageId, TransportError> {
        let request = SendRequest {
            body,
            attributes: trace_attributes(trace_context),
            message_group_id: self.message_group_id.clone(),
            deduplication_id: self.deduplication_id(),
        };

        let message_id = match self.mode {
            SubmissionMode::Blocking => self.transport.send_message(request).await?,
            SubmissionMode::Detached => {
                let transport = Arc::clone(&self.transport);
                mdc::spawn(async move { transport.send_message(request).await })
                    .await
                    .map_err(|e| TransportError::new("SendMessage", e))??
            }
        };

        info!(message_id = %message_id, "message sent");
        Ok(message_id)
    }

    /// Sends `bodies` in batches of at most ten entries.
    ///
    /// Every entry carries the current trace context. Entries rejected by
    /// the transport are reported in the result; a failed batch call stops
    /// at that batch and returns the error.
    pub async fn send_batch(
        &self,
        bodies: Vec<String>,
    ) -> Result<Vec<BatchEntryResult>, TransportError> {
        let attributes = trace_attributes(TraceContext::current().as_ref());
        let mut results = Vec::with_capacity(bodies.len());
        let mut bodies = bodies.into_iter().peekable();
        let mut batch_index = 0;

        while bodies.peek().is_some() {
            let message_group_id = self.batch_group_id(batch_index);
            let entries: Vec<BatchEntry> = bodies
                .by_ref()
                .take(MAX_BATCH_ENTRIES)
                .map(|body| BatchEntry {
                    id: Uuid::new_v4().to_string(),
                    body,
                    attributes: attributes.clone(),
                    message_group_id: message_group_id.clone(),
                    deduplication_id: self.deduplication_id(),
                })
                .collect();
            let count = entries.len();

            let batch = self
                .transport
                .send_message_batch(entries)
                .await
                .inspect_err(|e| warn!(batch = batch_index, error = %e, "batch send failed"))?;
            let failed = batch.iter().filter(|result| !result.is_sent()).count();
            if failed > 0 {
                warn!(failed, count, "batch entries rejected");
            } else {
                debug!(count, "batch sent");
            }
            results.extend(batch);
            batch_index += 1;
        }

        info!(count = results.len(), "messages sent");
        Ok(results)
    }

    fn batch_group_id(&self, batch_index: usize) -> Option<String> {
        let group = self.message_group_id.as_ref()?;
        match self.batch_grouping {
            BatchGrouping::PerBatch if batch_index > 0 => Some(format!("{group}-{batch_index}")),
            _ => Some(group.clone()),
        }
    }

    fn deduplication_id(&self) -> Option<String> {
        self.message_group_id
            .as_ref()
            .map(|_| Uuid::new_v4().to_string())
    }
}

fn trace_attributes(trace_context: Option<&TraceContext>) -> MessageAttributes {
    let mut attributes = MessageAttributes::new();
    match trace_context {
        Some(trace_context) => trace_context.inject(&mut attributes),
        None => debug!("no active span, sending without trace context"),
    }
    attributes
}
