//! Receives messages and processes each under the trace context it carries.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::SubmissionMode;
use crate::error::{BoxError, TransportError};
use crate::mdc::{self, MdcFutureExt, Snapshot};
use crate::message::{Message, Outcome, Payload, ProcessedResult, ReceiveRequest};
use crate::span;
use crate::trace_context::TraceContext;
use crate::transport::QueueTransport;

/// Business logic run for every received message.
///
/// Returning an error leaves the message unacknowledged, so the transport
/// redelivers it after the visibility timeout.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<(), BoxError>;
}

/// Runs once after every receive cycle, also when nothing was received.
#[async_trait]
pub trait PostReceiveHook: Send + Sync {
    async fn post_receive(&self, results: &[ProcessedResult]);
}

/// Logs each message with its system attributes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, message: &Message) -> Result<(), BoxError> {
        info!(
            message_id = %message.id,
            attributes = %format_system_attributes(message),
            "message received"
        );
        match serde_json::from_str::<Payload>(&message.body) {
            Ok(payload) => info!(
                payload_id = %payload.id,
                content = %payload.content,
                timestamp = %payload.timestamp,
                "payload"
            ),
            Err(_) => info!(body = %message.body, "payload"),
        }
        Ok(())
    }
}

/// Logs `postReceive` in a child span of the scheduled invocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPostReceive;

#[async_trait]
impl PostReceiveHook for LoggingPostReceive {
    async fn post_receive(&self, results: &[ProcessedResult]) {
        let acknowledged = results.iter().filter(|r| r.is_acknowledged()).count();
        async { info!(received = results.len(), acknowledged, "postReceive") }
            .with_mdc(Snapshot::for_span(&span::post_receive()))
            .await;
    }
}

pub struct Consumer<T, H> {
    transport: Arc<T>,
    handler: H,
    mode: SubmissionMode,
    max_messages: i32,
    wait_time_seconds: i32,
    post_receive: Option<Box<dyn PostReceiveHook>>,
}

impl<T, H> Consumer<T, H>
where
    T: QueueTransport + 'static,
    H: MessageHandler,
{
    pub fn new(transport: Arc<T>, handler: H) -> Self {
        Self {
            transport,
            handler,
            mode: SubmissionMode::Blocking,
            max_messages: 1,
            wait_time_seconds: 0,
            post_receive: None,
        }
    }

    pub fn with_mode(mut self, mode: SubmissionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Messages requested by [`Consumer::poll`].
    pub fn with_max_messages(mut self, max_messages: i32) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_wait_time_seconds(mut self, wait_time_seconds: i32) -> Self {
        self.wait_time_seconds = wait_time_seconds;
        self
    }

    pub fn with_post_receive(mut self, hook: impl PostReceiveHook + 'static) -> Self {
        self.post_receive = Some(Box::new(hook));
        self
    }

    /// One scheduled receive cycle: [`Consumer::receive`], then the
    /// post-receive hook under the caller's context.
    pub async fn poll(&self) -> Result<Vec<ProcessedResult>, TransportError> {
        let results = self.receive(self.max_messages).await?;
        if let Some(hook) = &self.post_receive {
            hook.post_receive(&results).await;
        }
        Ok(results)
    }

    /// Receives up to `max_messages` and processes them in order.
    ///
    /// A message carrying a trace context is handled inside a consumer span
    /// parented by the sending span, with the MDC set to that span's ids.
    /// Other messages are handled under the caller's context. Each message is
    /// deleted right after its handler succeeds. The first failure stops the
    /// batch: later messages are reported as [`Outcome::Skipped`] and stay
    /// unacknowledged.
    pub async fn receive(&self, max_messages: i32) -> Result<Vec<ProcessedResult>, TransportError> {
        let request = ReceiveRequest {
            max_messages,
            attribute_names: TraceContext::attribute_names(),
            wait_time_seconds: self.wait_time_seconds,
        };
        let messages = self.receive_messages(request).await?;
        debug!(count = messages.len(), "received messages");

        let mut results = Vec::with_capacity(messages.len());
        let mut messages = messages.into_iter();

        for message in messages.by_ref() {
            let trace_context = TraceContext::extract(&message.attributes);
            let outcome = match &trace_context {
                Some(trace_context) => {
                    let span = span::receive_message(trace_context);
                    let outcome = self
                        .process(&message)
                        .with_mdc(Snapshot::for_span(&span))
                        .await?;
                    if let Outcome::Failed(reason) = &outcome {
                        span::record_error(&span, reason);
                    }
                    outcome
                }
                None => self.process(&message).await?,
            };

            let failed = matches!(outcome, Outcome::Failed(_));
            results.push(ProcessedResult {
                message,
                trace_context,
                outcome,
            });
            if failed {
                break;
            }
        }

        let skipped: Vec<ProcessedResult> = messages
            .map(|message| ProcessedResult {
                trace_context: TraceContext::extract(&message.attributes),
                message,
                outcome: Outcome::Skipped,
            })
            .collect();
        if !skipped.is_empty() {
            warn!(count = skipped.len(), "skipped messages after failure");
        }
        results.extend(skipped);

        Ok(results)
    }

    async fn receive_messages(&self, request: ReceiveRequest) -> Result<Vec<Message>, TransportError> {
        match self.mode {
            SubmissionMode::Blocking => self.transport.receive_message(request).await,
            SubmissionMode::Detached => {
                let transport = Arc::clone(&self.transport);
                mdc::spawn(async move { transport.receive_message(request).await })
                    .await
                    .map_err(|e| TransportError::new("ReceiveMessage", e))?
            }
        }
    }

    /// Runs the handler and acknowledges on success, in a `deleteMessage`
    /// child span whose ids replace those in the MDC. Only a failed delete is
    /// an error; a failed handler is an outcome.
    async fn process(&self, message: &Message) -> Result<Outcome, TransportError> {
        if let Err(e) = self.handler.handle(message).await {
            warn!(message_id = %message.id, error = %e, "message processing failed");
            return Ok(Outcome::Failed(e.to_string()));
        }

        self.delete(&message.receipt_handle)
            .with_mdc(Snapshot::for_span(&span::delete_message()))
            .await?;
        debug!(message_id = %message.id, "message deleted");
        Ok(Outcome::Acknowledged)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), TransportError> {
        match self.mode {
            SubmissionMode::Blocking => self.transport.delete_message(receipt_handle).await,
            SubmissionMode::Detached => {
                let transport = Arc::clone(&self.transport);
                let receipt_handle = receipt_handle.to_string();
                mdc::spawn(async move { transport.delete_message(&receipt_handle).await })
                    .await
                    .map_err(|e| TransportError::new("DeleteMessage", e))?
            }
        }
    }
}

fn format_system_attributes(message: &Message) -> String {
    let mut attributes: Vec<_> = message.system_attributes.iter().collect();
    attributes.sort();
    attributes
        .iter()
        .map(|(key, value)| format!("{key}=\"{value}\""))
        .collect::<Vec<_>>()
        .join(", ")
}
