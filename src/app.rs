//! Wires the producer and consumer into scheduled jobs.

use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::consumer::{Consumer, LoggingHandler, LoggingPostReceive};
use crate::error::Result;
use crate::message::Payload;
use crate::producer::Producer;
use crate::scheduler::Scheduler;
use crate::transport::{MemoryTransport, QueueTransport, SqsTransport};

pub const SEND_JOB: &str = "send-job";
pub const RECEIVE_JOB: &str = "receive-job";

/// Which scheduled jobs a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Both,
    Producer,
    Consumer,
}

impl Role {
    fn sends(self) -> bool {
        matches!(self, Role::Both | Role::Producer)
    }

    fn receives(self) -> bool {
        matches!(self, Role::Both | Role::Consumer)
    }
}

/// Runs the jobs of `role` until Ctrl-C.
pub async fn run(config: &AppConfig, role: Role) -> Result<()> {
    let mut scheduler = Scheduler::new();

    if config.uses_memory_queue() {
        let transport = Arc::new(MemoryTransport::new(config.memory_visibility_timeout));
        schedule(&mut scheduler, transport, config, role);
    } else {
        let transport = Arc::new(SqsTransport::from_env(config.queue_url.clone()).await);
        schedule(&mut scheduler, transport, config, role);
    }

    let shutdown = scheduler.shutdown_handle();
    ctrlc::set_handler(move || shutdown.shutdown())?;

    info!(
        queue_url = %config.queue_url,
        mode = ?config.submission_mode,
        "running, press Ctrl+C to stop"
    );
    scheduler.join().await;
    info!("stopped");
    Ok(())
}

/// Registers the jobs of `role` on `scheduler`, all sharing `transport`.
pub fn schedule<T>(scheduler: &mut Scheduler, transport: Arc<T>, config: &AppConfig, role: Role)
where
    T: QueueTransport + 'static,
{
    if role.sends() {
        let mut producer =
            Producer::new(Arc::clone(&transport)).with_mode(config.submission_mode);
        if let Some(group_id) = &config.message_group_id {
            producer = producer.with_message_group_id(group_id.clone());
        }
        let producer = Arc::new(producer);

        scheduler.every(SEND_JOB, config.send_interval, move || {
            let producer = Arc::clone(&producer);
            async move {
                let body = serde_json::to_string(&Payload::new())?;
                producer.send(body).await?;
                Ok::<_, crate::error::Error>(())
            }
        });
    }

    if role.receives() {
        let consumer = Arc::new(
            Consumer::new(transport, LoggingHandler)
                .with_mode(config.submission_mode)
                .with_max_messages(config.max_messages)
                .with_wait_time_seconds(config.wait_time_seconds)
                .with_post_receive(LoggingPostReceive),
        );

        scheduler.every(RECEIVE_JOB, config.receive_interval, move || {
            let consumer = Arc::clone(&consumer);
            async move {
                consumer.poll().await?;
                Ok::<_, crate::error::Error>(())
            }
        });
    }
}
