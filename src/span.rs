//! The `tracing` spans around scheduled invocations and received messages.
//!
//! They are exported through the `tracing-opentelemetry` layer installed by
//! [`crate::telemetry::init_telemetry`]; their OpenTelemetry ids are what
//! travels in message attributes and what the MDC shows.

use tracing::field::Empty;
use tracing::{info_span, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::trace_context::TraceContext;

/// A span without parent for one run of the job `identity`.
pub fn invocation(identity: &'static str) -> Span {
    info_span!(parent: None, "invocation", otel.name = identity, job = identity)
}

/// A consumer span whose parent is the remote span that sent a message.
///
/// The sending span may have ended long ago; only its ids are known.
pub fn receive_message(remote: &TraceContext) -> Span {
    let span = info_span!(
        "Sqs.ReceiveMessage",
        otel.kind = "consumer",
        otel.status_code = Empty,
        otel.status_message = Empty,
    );
    // Must happen before the span is entered or its context is read.
    let _ = span.set_parent(remote.remote_parent());
    span
}

/// Child of the current span for the hook run after a receive cycle.
pub fn post_receive() -> Span {
    info_span!("postReceive")
}

/// Child of the current span for acknowledging one message.
pub fn delete_message() -> Span {
    info_span!("deleteMessage")
}

pub fn record_error(span: &Span, description: &str) {
    span.record("otel.status_code", "error");
    span.record("otel.status_message", description);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::init_tracing;

    const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
    const SPAN_ID: &str = "00f067aa0ba902b7";

    fn ids(span: &Span) -> TraceContext {
        TraceContext::from_context(&span.context()).unwrap()
    }

    #[test]
    fn receive_span_continues_remote_trace() {
        init_tracing();
        let remote = TraceContext::from_hex(TRACE_ID, SPAN_ID).unwrap();

        let linked = ids(&receive_message(&remote));

        assert_eq!(linked.trace_id(), remote.trace_id());
        assert_ne!(linked.span_id(), remote.span_id());
    }

    #[test]
    fn invocation_starts_new_trace_inside_another_span() {
        init_tracing();
        let remote = TraceContext::from_hex(TRACE_ID, SPAN_ID).unwrap();
        let outer = receive_message(&remote);

        let invocation = outer.in_scope(|| invocation("send-job"));

        assert_ne!(ids(&invocation).trace_id().to_string(), TRACE_ID);
    }

    #[test]
    fn child_spans_share_trace_of_current_span() {
        init_tracing();
        let root = invocation("receive-job");

        let (post, delete) = root.in_scope(|| (post_receive(), delete_message()));

        assert_eq!(ids(&post).trace_id(), ids(&root).trace_id());
        assert_eq!(ids(&delete).trace_id(), ids(&root).trace_id());
        assert_ne!(ids(&delete).span_id(), ids(&root).span_id());
    }

    #[test]
    fn record_error_keeps_the_span_usable() {
        init_tracing();
        let remote = TraceContext::from_hex(TRACE_ID, SPAN_ID).unwrap();
        let span = receive_message(&remote);

        record_error(&span, "cannot process message-1");

        assert_eq!(ids(&span).trace_id(), remote.trace_id());
    }
}
