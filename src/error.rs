//! Error types for sqs-send-receive.

use thiserror::Error;

/// Boxed error used for transport sources and handler failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failed call into the queue transport.
///
/// The transport's own error is kept as the source, untranslated.
#[derive(Debug, Error)]
#[error("{operation} failed: {source}")]
pub struct TransportError {
    operation: &'static str,
    #[source]
    source: BoxError,
}

impl TransportError {
    pub fn new(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }

    /// Name of the transport operation, e.g. `SendMessage`.
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to initialize telemetry: {0}")]
    Telemetry(String),

    #[error("failed to encode payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
