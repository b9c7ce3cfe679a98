//! Propagation of a span context as a `traceId` / `spanId` attribute pair.
//!
//! Unlike W3C `traceparent`, the pair format carries no flags and no trace
//! state: every extracted context is treated as sampled with an empty trace
//! state, and the receiving side starts a span whose parent is the remote
//! span identified by the pair.

use opentelemetry::{
    propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator},
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context,
};

/// Attribute holding the 32 hex digit trace id.
pub const TRACE_ID_KEY: &str = "traceId";
/// Attribute holding the 16 hex digit span id.
pub const SPAN_ID_KEY: &str = "spanId";

const TRACE_ID_HEX_LEN: usize = 32;
const SPAN_ID_HEX_LEN: usize = 16;

/// Propagates span contexts as two plain string attributes.
///
/// ## Examples
///
/// ```
/// use opentelemetry::propagation::TextMapPropagator;
/// use opentelemetry::trace::TraceContextExt;
/// use opentelemetry_aws_messaging::{AttributesExtractor, IdPairPropagator};
/// use std::collections::HashMap;
///
/// let attributes = HashMap::from([
///     ("traceId".to_string(), "4bf92f3577b34da6a3ce929d0e0e4736".to_string()),
///     ("spanId".to_string(), "00f067aa0ba902b7".to_string()),
/// ]);
/// let cx = IdPairPropagator::new().extract(&AttributesExtractor(&attributes));
///
/// assert!(cx.span().span_context().is_remote());
/// assert_eq!(cx.span().span_context().span_id().to_string(), "00f067aa0ba902b7");
/// ```
#[derive(Clone, Debug)]
pub struct IdPairPropagator {
    fields: [String; 2],
}

impl Default for IdPairPropagator {
    fn default() -> Self {
        IdPairPropagator::new()
    }
}

impl IdPairPropagator {
    /// Create a propagator using the `traceId` / `spanId` attribute names.
    pub fn new() -> Self {
        IdPairPropagator {
            fields: [TRACE_ID_KEY.to_owned(), SPAN_ID_KEY.to_owned()],
        }
    }

    fn extract_span_context(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
        let trace_id = extractor.get(TRACE_ID_KEY)?;
        let span_id = extractor.get(SPAN_ID_KEY)?;
        if trace_id.len() != TRACE_ID_HEX_LEN || span_id.len() != SPAN_ID_HEX_LEN {
            return None;
        }

        let trace_id = TraceId::from_hex(trace_id).ok()?;
        let span_id = SpanId::from_hex(span_id).ok()?;
        let span_context = SpanContext::new(
            trace_id,
            span_id,
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );

        span_context.is_valid().then_some(span_context)
    }
}

impl TextMapPropagator for IdPairPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span = cx.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            injector.set(TRACE_ID_KEY, span_context.trace_id().to_string());
            injector.set(SPAN_ID_KEY, span_context.span_id().to_string());
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.extract_span_context(extractor)
            .map(|sc| cx.with_remote_span_context(sc))
            .unwrap_or_else(|| cx.clone())
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(self.fields.as_ref())
    }
}
