//! Periodic send and receive over an SQS FIFO queue with the trace context
//! carried in message attributes.
//!
//! The producer attaches the `traceId` and `spanId` of the sending span to
//! every message. The consumer restores them as the remote parent of a
//! consumer span and seeds the MDC from it, so the log lines of the receiving
//! side can be attributed to the trace that sent the message.
//!
//! # Modules
//!
//! - [`producer`] / [`consumer`] - send, receive, acknowledge on success
//! - [`trace_context`] / [`span`] - the propagated ids and the spans around them
//! - [`mdc`] - log context carried across tasks and threads
//! - [`transport`] - SQS and an in-process FIFO queue
//! - [`scheduler`] / [`app`] - the periodic `send-job` and `receive-job`

pub mod app;
pub mod config;
pub mod consumer;
pub mod error;
pub mod mdc;
pub mod message;
pub mod producer;
pub mod scheduler;
pub mod span;
pub mod telemetry;
pub mod trace_context;
pub mod transport;

#[doc(hidden)]
pub mod testing;

pub use config::{AppConfig, SubmissionMode};
pub use consumer::{Consumer, LoggingHandler, LoggingPostReceive, MessageHandler, PostReceiveHook};
pub use error::{BoxError, Error, Result, TransportError};
pub use message::{Message, MessageAttributes, MessageId, Outcome, Payload, ProcessedResult};
pub use producer::{BatchGrouping, Producer};
pub use scheduler::{Scheduler, ShutdownHandle};
pub use trace_context::TraceContext;
pub use transport::{MemoryTransport, QueueTransport, SqsTransport};
