#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqs_send_receive::message::{BatchEntry, BatchEntryResult, ReceiveRequest, SendRequest};
use sqs_send_receive::{
    mdc, BoxError, MemoryTransport, Message, MessageHandler, MessageId, QueueTransport,
    TraceContext, TransportError,
};

pub const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
pub const SPAN_ID: &str = "00f067aa0ba902b7";

/// Context a delete call was made in.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteContext {
    pub receipt_handle: String,
    pub mdc_trace_id: Option<String>,
    pub mdc_span_id: Option<String>,
    pub current_span: Option<TraceContext>,
}

/// Memory queue that records the calls made to it.
#[derive(Default)]
pub struct RecordingTransport {
    pub inner: MemoryTransport,
    pub sent: Mutex<Vec<SendRequest>>,
    pub batches: Mutex<Vec<Vec<BatchEntry>>>,
    pub deleted: Mutex<Vec<DeleteContext>>,
    /// Zero-based index of the batch call that fails as a whole.
    pub fail_batch_call: Mutex<Option<usize>>,
}

impl RecordingTransport {
    pub fn new(inner: MemoryTransport) -> Arc<Self> {
        Arc::new(Self {
            inner,
            ..Default::default()
        })
    }

    pub fn sent(&self) -> Vec<SendRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<Vec<BatchEntry>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn fail_batch_call(&self, index: usize) {
        *self.fail_batch_call.lock().unwrap() = Some(index);
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap()
            .iter()
            .map(|delete| delete.receipt_handle.clone())
            .collect()
    }

    pub fn delete_contexts(&self) -> Vec<DeleteContext> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueTransport for RecordingTransport {
    async fn send_message(&self, request: SendRequest) -> Result<MessageId, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        self.inner.send_message(request).await
    }

    async fn send_message_batch(
        &self,
        entries: Vec<BatchEntry>,
    ) -> Result<Vec<BatchEntryResult>, TransportError> {
        let call = {
            let mut batches = self.batches.lock().unwrap();
            batches.push(entries.clone());
            batches.len() - 1
        };
        if *self.fail_batch_call.lock().unwrap() == Some(call) {
            return Err(TransportError::new("SendMessageBatch", "ServiceUnavailable"));
        }
        self.inner.send_message_batch(entries).await
    }

    async fn receive_message(&self, request: ReceiveRequest) -> Result<Vec<Message>, TransportError> {
        self.inner.receive_message(request).await
    }

    async fn delete_message(&self, receipt_handle: &str) -> Result<(), TransportError> {
        self.deleted.lock().unwrap().push(DeleteContext {
            receipt_handle: receipt_handle.to_string(),
            mdc_trace_id: mdc::get("traceId"),
            mdc_span_id: mdc::get("spanId"),
            current_span: TraceContext::current(),
        });
        self.inner.delete_message(receipt_handle).await
    }
}

/// What a handler observed while processing one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Observed {
    pub body: String,
    pub mdc_trace_id: Option<String>,
    pub mdc_span_id: Option<String>,
    pub current_span: Option<TraceContext>,
}

/// Records the context each message is handled in and fails on the bodies
/// it is told to.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    observed: Arc<Mutex<Vec<Observed>>>,
    fail_on: Arc<Mutex<HashSet<String>>>,
}

impl RecordingHandler {
    pub fn failing_on(bodies: &[&str]) -> Self {
        let handler = Self::default();
        handler.set_failing(bodies);
        handler
    }

    pub fn set_failing(&self, bodies: &[&str]) {
        *self.fail_on.lock().unwrap() = bodies.iter().map(|b| b.to_string()).collect();
    }

    pub fn observed(&self) -> Vec<Observed> {
        self.observed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: &Message) -> Result<(), BoxError> {
        tokio::task::yield_now().await;

        self.observed.lock().unwrap().push(Observed {
            body: message.body.clone(),
            mdc_trace_id: mdc::get("traceId"),
            mdc_span_id: mdc::get("spanId"),
            current_span: TraceContext::current(),
        });

        if self.fail_on.lock().unwrap().contains(&message.body) {
            return Err(format!("cannot process {}", message.body).into());
        }
        Ok(())
    }
}
