mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqs_send_receive::app::{self, Role};
use sqs_send_receive::mdc::{self, MdcFutureExt, Snapshot};
use sqs_send_receive::span;
use sqs_send_receive::testing::init_tracing;
use sqs_send_receive::{
    AppConfig, Consumer, LoggingPostReceive, MemoryTransport, PostReceiveHook, ProcessedResult,
    Producer, Scheduler, TraceContext,
};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use common::{RecordingHandler, RecordingTransport, SPAN_ID, TRACE_ID};

/// Records how many results it saw and the MDC trace id it ran under.
#[derive(Clone, Default)]
struct RecordingHook {
    calls: Arc<Mutex<Vec<(usize, Option<String>)>>>,
}

#[async_trait]
impl PostReceiveHook for RecordingHook {
    async fn post_receive(&self, results: &[ProcessedResult]) {
        self.calls
            .lock()
            .unwrap()
            .push((results.len(), mdc::get("traceId")));
    }
}

fn memory_config(vars: &[(&str, &str)]) -> AppConfig {
    let vars: Vec<(String, String)> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .chain([("SQS_QUEUE_URL".to_string(), "memory://local".to_string())])
        .collect();
    AppConfig::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap()
}

#[tokio::test]
async fn post_receive_runs_once_even_without_messages() {
    init_tracing();
    let transport = Arc::new(MemoryTransport::default());
    let hook = RecordingHook::default();
    let consumer =
        Consumer::new(Arc::clone(&transport), RecordingHandler::default()).with_post_receive(hook.clone());
    let invocation = span::invocation("receive-job");
    let invocation_trace_id = TraceContext::from_context(&invocation.context())
        .unwrap()
        .trace_id()
        .to_string();

    let results = consumer
        .poll()
        .with_mdc(Snapshot::for_span(&invocation))
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(
        *hook.calls.lock().unwrap(),
        vec![(0, Some(invocation_trace_id))]
    );
}

#[tokio::test]
async fn post_receive_runs_under_the_invocation_not_the_message_trace() {
    init_tracing();
    let transport = Arc::new(MemoryTransport::default());
    let hook = RecordingHook::default();
    let handler = RecordingHandler::default();
    let consumer = Consumer::new(Arc::clone(&transport), handler.clone())
        .with_max_messages(10)
        .with_post_receive(hook.clone());
    let remote = TraceContext::from_hex(TRACE_ID, SPAN_ID).unwrap();
    let producer = Producer::new(Arc::clone(&transport));
    for body in ["message-1", "message-2"] {
        producer
            .send_with_context(body.to_string(), Some(&remote))
            .await
            .unwrap();
    }
    let invocation = span::invocation("receive-job");
    let invocation_trace_id = TraceContext::from_context(&invocation.context())
        .unwrap()
        .trace_id()
        .to_string();

    consumer
        .poll()
        .with_mdc(Snapshot::for_span(&invocation))
        .await
        .unwrap();

    assert!(handler
        .observed()
        .iter()
        .all(|o| o.mdc_trace_id.as_deref() == Some(TRACE_ID)));
    assert_eq!(
        *hook.calls.lock().unwrap(),
        vec![(2, Some(invocation_trace_id))]
    );
}

#[tokio::test]
async fn logging_post_receive_leaves_the_invocation_context_untouched() {
    init_tracing();
    let transport = Arc::new(MemoryTransport::default());
    let consumer = Consumer::new(Arc::clone(&transport), RecordingHandler::default())
        .with_post_receive(LoggingPostReceive);
    let invocation = span::invocation("receive-job");
    let snapshot = Snapshot::for_span(&invocation);
    let expected = snapshot.get("spanId").map(str::to_string);

    let span_id = async {
        consumer.poll().await.unwrap();
        mdc::get("spanId")
    }
    .with_mdc(snapshot)
    .await;

    assert!(expected.is_some());
    assert_eq!(span_id, expected);
}

#[tokio::test(start_paused = true)]
async fn scheduled_jobs_send_and_receive() {
    init_tracing();
    let config = memory_config(&[
        ("SEND_INTERVAL_SECS", "3"),
        ("RECEIVE_INTERVAL_SECS", "2"),
    ]);
    let transport = RecordingTransport::new(MemoryTransport::new(config.memory_visibility_timeout));
    let mut scheduler = Scheduler::new();
    app::schedule(&mut scheduler, Arc::clone(&transport), &config, Role::Both);

    tokio::time::sleep(Duration::from_millis(7500)).await;
    scheduler.shutdown_handle().shutdown();
    scheduler.join().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|request| request.attributes.contains_key("traceId")));
    assert!(transport.deleted().len() >= 2);
    assert_eq!(transport.inner.len(), sent.len() - transport.deleted().len());
}

#[tokio::test(start_paused = true)]
async fn producer_role_only_sends() {
    let config = memory_config(&[("SEND_INTERVAL_SECS", "1")]);
    let transport = RecordingTransport::new(MemoryTransport::default());
    let mut scheduler = Scheduler::new();
    app::schedule(&mut scheduler, Arc::clone(&transport), &config, Role::Producer);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.shutdown_handle().shutdown();
    scheduler.join().await;

    assert_eq!(transport.sent().len(), 3);
    assert!(transport.deleted().is_empty());
    assert_eq!(transport.inner.len(), 3);
}
