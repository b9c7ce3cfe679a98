use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::MAX_BATCH_ENTRIES;

/// Queue URL scheme selecting the in-process [`crate::transport::MemoryTransport`].
pub const MEMORY_QUEUE_SCHEME: &str = "memory://";

const DEFAULT_SERVICE_NAME: &str = "sqs-send-receive";
const FIFO_QUEUE_SUFFIX: &str = ".fifo";
const DEFAULT_MESSAGE_GROUP_ID: &str = "a";
const MAX_WAIT_TIME_SECONDS: i32 = 20;

/// How the producer and consumer submit calls to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionMode {
    /// The transport call is awaited in place.
    #[default]
    Blocking,
    /// The transport call runs on its own task; the caller continues once
    /// the task completes.
    Detached,
}

/// Configuration of the send and receive jobs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQS queue URL, or `memory://<name>` for the in-process queue
    pub queue_url: String,
    pub submission_mode: SubmissionMode,
    /// Message group for FIFO queues
    pub message_group_id: Option<String>,
    pub send_interval: Duration,
    pub receive_interval: Duration,
    /// Messages requested per receive (1..=10)
    pub max_messages: i32,
    /// Long polling wait (0..=20 seconds)
    pub wait_time_seconds: i32,
    /// Visibility timeout of the in-process queue
    pub memory_visibility_timeout: Duration,
    pub service_name: String,
    /// Export spans through Datadog
    pub datadog_tracing: bool,
}

impl AppConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key lookup, e.g. a map in tests
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let queue_url = lookup("SQS_QUEUE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::Config("SQS_QUEUE_URL environment variable not set".to_string()))?;

        let submission_mode = if parse_bool(&lookup, "SQS_CLIENT_ASYNC")?.unwrap_or(false) {
            SubmissionMode::Detached
        } else {
            SubmissionMode::Blocking
        };

        let message_group_id = match lookup("SQS_MESSAGE_GROUP_ID") {
            Some(group_id) if !group_id.is_empty() => Some(group_id),
            _ if queue_url.ends_with(FIFO_QUEUE_SUFFIX) => Some(DEFAULT_MESSAGE_GROUP_ID.to_string()),
            _ => None,
        };

        let config = Self {
            queue_url,
            submission_mode,
            message_group_id,
            send_interval: Duration::from_secs(parse_number(&lookup, "SEND_INTERVAL_SECS")?.unwrap_or(3)),
            receive_interval: Duration::from_secs(
                parse_number(&lookup, "RECEIVE_INTERVAL_SECS")?.unwrap_or(2),
            ),
            max_messages: parse_number(&lookup, "RECEIVE_MAX_MESSAGES")?.unwrap_or(1),
            wait_time_seconds: parse_number(&lookup, "RECEIVE_WAIT_TIME_SECONDS")?.unwrap_or(0),
            memory_visibility_timeout: Duration::from_secs(
                parse_number(&lookup, "MEMORY_VISIBILITY_TIMEOUT_SECS")?.unwrap_or(30),
            ),
            service_name: lookup("OTEL_SERVICE_NAME")
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            datadog_tracing: parse_bool(&lookup, "DD_TRACE_ENABLED")?.unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.send_interval.is_zero() {
            return Err(Error::Config("SEND_INTERVAL_SECS must be greater than 0".to_string()));
        }
        if self.receive_interval.is_zero() {
            return Err(Error::Config(
                "RECEIVE_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }
        if !(1..=MAX_BATCH_ENTRIES as i32).contains(&self.max_messages) {
            return Err(Error::Config(format!(
                "RECEIVE_MAX_MESSAGES must be between 1 and {MAX_BATCH_ENTRIES}, got {}",
                self.max_messages
            )));
        }
        if !(0..=MAX_WAIT_TIME_SECONDS).contains(&self.wait_time_seconds) {
            return Err(Error::Config(format!(
                "RECEIVE_WAIT_TIME_SECONDS must be between 0 and {MAX_WAIT_TIME_SECONDS}, got {}",
                self.wait_time_seconds
            )));
        }
        Ok(())
    }

    pub fn uses_memory_queue(&self) -> bool {
        self.queue_url.starts_with(MEMORY_QUEUE_SCHEME)
    }
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" | "" => Ok(Some(false)),
            other => Err(Error::Config(format!("{key}: expected a boolean, got {other:?}"))),
        },
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| Error::Config(format!("{key}: expected a number, got {value:?}")))
        })
        .transpose()
}
