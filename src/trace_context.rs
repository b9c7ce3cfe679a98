//! Explicit trace context carried on messages.

use std::fmt;

use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use opentelemetry::Context;
use opentelemetry_aws_messaging::{AttributesExtractor, AttributesInjector, IdPairPropagator};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::message::MessageAttributes;

/// The `(traceId, spanId)` pair identifying the operation that produced a
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
}

impl TraceContext {
    pub fn new(trace_id: TraceId, span_id: SpanId) -> Self {
        Self { trace_id, span_id }
    }

    /// Parses a 32 hex digit trace id and a 16 hex digit span id.
    pub fn from_hex(trace_id: &str, span_id: &str) -> Option<Self> {
        let attributes = MessageAttributes::from([
            (opentelemetry_aws_messaging::TRACE_ID_KEY.to_string(), trace_id.to_string()),
            (opentelemetry_aws_messaging::SPAN_ID_KEY.to_string(), span_id.to_string()),
        ]);
        Self::extract(&attributes)
    }

    /// The span of `cx`, if it has a valid one.
    pub fn from_context(cx: &Context) -> Option<Self> {
        let span = cx.span();
        let span_context = span.span_context();
        span_context
            .is_valid()
            .then(|| Self::new(span_context.trace_id(), span_context.span_id()))
    }

    /// The `tracing` span active on the current task.
    pub fn current() -> Option<Self> {
        Self::from_context(&Span::current().context())
    }

    /// Names of the attributes this context travels in, to be requested on
    /// receive.
    pub fn attribute_names() -> Vec<String> {
        IdPairPropagator::new().fields().map(str::to_string).collect()
    }

    pub fn inject(&self, attributes: &mut MessageAttributes) {
        IdPairPropagator::new()
            .inject_context(&self.remote_parent(), &mut AttributesInjector(attributes));
    }

    /// Reads the context from message attributes.
    ///
    /// Missing or malformed ids yield `None`: the message simply carries no
    /// propagated context.
    pub fn extract(attributes: &MessageAttributes) -> Option<Self> {
        let cx = IdPairPropagator::new()
            .extract_with_context(&Context::new(), &AttributesExtractor(attributes));
        Self::from_context(&cx)
    }

    /// A context holding this pair as remote, sampled parent span.
    pub fn remote_parent(&self) -> Context {
        Context::new().with_remote_span_context(SpanContext::new(
            self.trace_id,
            self.span_id,
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        ))
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.trace_id, self.span_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
    const SPAN_ID: &str = "00f067aa0ba902b7";

    #[test]
    fn inject_writes_string_ids() {
        let cx = TraceContext::from_hex(TRACE_ID, SPAN_ID).unwrap();
        let mut attributes = MessageAttributes::new();

        cx.inject(&mut attributes);

        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes["traceId"], TRACE_ID);
        assert_eq!(attributes["spanId"], SPAN_ID);
    }

    #[test]
    fn extract_reads_back_injected_ids() {
        let cx = TraceContext::from_hex(TRACE_ID, SPAN_ID).unwrap();
        let mut attributes = MessageAttributes::from([("other".to_string(), "x".to_string())]);
        cx.inject(&mut attributes);

        let extracted = TraceContext::extract(&attributes).unwrap();

        assert_eq!(extracted, cx);
        assert_eq!(extracted.to_string(), format!("{TRACE_ID}-{SPAN_ID}"));
    }

    #[test]
    fn extract_without_attributes_is_absent() {
        assert_eq!(TraceContext::extract(&MessageAttributes::new()), None);
    }

    #[test]
    fn from_hex_rejects_invalid_ids() {
        assert_eq!(TraceContext::from_hex("not-hex", SPAN_ID), None);
        assert_eq!(TraceContext::from_hex(TRACE_ID, ""), None);
    }

    #[test]
    fn remote_parent_is_sampled_and_remote() {
        let cx = TraceContext::from_hex(TRACE_ID, SPAN_ID).unwrap().remote_parent();
        let span = cx.span();
        let sc = span.span_context();

        assert!(sc.is_remote());
        assert!(sc.is_sampled());
        assert_eq!(sc.trace_id().to_string(), TRACE_ID);
    }

    #[test]
    fn attribute_names_are_the_pair() {
        assert_eq!(TraceContext::attribute_names(), vec!["traceId", "spanId"]);
    }

    #[test]
    fn current_is_absent_outside_a_span() {
        crate::testing::init_tracing();

        assert_eq!(TraceContext::current(), None);
    }

    #[test]
    fn current_is_the_entered_span() {
        crate::testing::init_tracing();
        let span = crate::span::invocation("send-job");

        let current = span.in_scope(TraceContext::current);

        assert_eq!(current, TraceContext::from_context(&span.context()));
        assert!(current.is_some());
    }
}
