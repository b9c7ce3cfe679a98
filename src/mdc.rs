//! Mapped diagnostic context (MDC).
//!
//! The MDC is a small key/value map owned by the current tokio task (or by
//! a blocking closure run through [`spawn_blocking`]). Every log line is
//! prefixed with it, see [`crate::telemetry::MdcFormat`]. It lives in a
//! `tokio::task_local!`, so a task only ever sees the map of its own scope
//! and never the map of another task scheduled on the same worker thread.
//!
//! A [`Snapshot`] pairs a copy of the map with the `tracing` span it belongs
//! to. Work moving to another task or thread takes its context along
//! explicitly:
//!
//! - [`capture`] takes a snapshot of the current map and span,
//! - [`MdcFutureExt::with_mdc`] runs a future in its own MDC scope, inside
//!   the snapshot's span,
//! - [`spawn`] and [`spawn_blocking`] do the same for new tasks and for the
//!   blocking pool.
//!
//! Inside a scope, [`restore`] and [`clear`] swap the map and return a
//! [`ContextGuard`] that puts the previous map back when released. Guards
//! nest in stack order. A guard is `!Send` and consumed by
//! [`ContextGuard::release`], so it can neither be released on another
//! thread nor released twice.
//!
//! Outside of any scope there is no map: [`put`] is ignored and [`get`]
//! returns `None`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use opentelemetry::trace::TraceContextExt;
use opentelemetry_aws_messaging::{SPAN_ID_KEY, TRACE_ID_KEY};
use tokio::task::futures::TaskLocalFuture;
use tokio::task::JoinHandle;
use tracing::instrument::Instrumented;
use tracing::span::EnteredSpan;
use tracing::{Instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

type Entries = BTreeMap<String, String>;

tokio::task_local! {
    static MDC: RefCell<Entries>;
}

/// A future running in its own MDC scope, inside a `tracing` span.
pub type WithMdc<F> = TaskLocalFuture<RefCell<Entries>, Instrumented<F>>;

pub fn put(key: impl Into<String>, value: impl Into<String>) {
    let _ = MDC.try_with(|mdc| {
        mdc.borrow_mut().insert(key.into(), value.into());
    });
}

pub fn get(key: &str) -> Option<String> {
    MDC.try_with(|mdc| mdc.borrow().get(key).cloned())
        .ok()
        .flatten()
}

/// Copy of the whole map; empty outside of a scope.
pub fn copy() -> BTreeMap<String, String> {
    MDC.try_with(|mdc| mdc.borrow().clone()).unwrap_or_default()
}

/// Runs `f` against the map without copying it.
///
/// Returns `None` outside of a scope.
pub(crate) fn with_entries<R>(f: impl FnOnce(&BTreeMap<String, String>) -> R) -> Option<R> {
    MDC.try_with(|mdc| f(&mdc.borrow())).ok()
}

/// A captured MDC map together with the span it belongs to.
#[derive(Debug, Clone)]
pub struct Snapshot {
    entries: Entries,
    span: Span,
}

impl Default for Snapshot {
    /// An empty map outside of any span.
    fn default() -> Self {
        Self {
            entries: Entries::new(),
            span: Span::none(),
        }
    }
}

impl Snapshot {
    /// Captures the current MDC, with `traceId` and `spanId` taken from
    /// `span`.
    ///
    /// If `span` is not recorded by an OpenTelemetry layer the ids already in
    /// the MDC are kept.
    pub fn for_span(span: &Span) -> Self {
        let mut entries = copy();
        let cx = span.context();
        let otel_span = cx.span();
        let span_context = otel_span.span_context();
        if span_context.is_valid() {
            entries.insert(TRACE_ID_KEY.to_string(), span_context.trace_id().to_string());
            entries.insert(SPAN_ID_KEY.to_string(), span_context.span_id().to_string());
        }
        Self {
            entries,
            span: span.clone(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Runs `f` in a new MDC scope holding this snapshot, inside its span.
    pub fn in_scope<R>(self, f: impl FnOnce() -> R) -> R {
        let Snapshot { entries, span } = self;
        MDC.sync_scope(RefCell::new(entries), || span.in_scope(f))
    }
}

/// Snapshot of the current task.
pub fn capture() -> Snapshot {
    Snapshot {
        entries: copy(),
        span: Span::current(),
    }
}

/// Installs `snapshot` in the current scope and enters its span until the
/// guard is released.
pub fn restore(snapshot: &Snapshot) -> ContextGuard {
    let previous = MDC
        .try_with(|mdc| mdc.replace(snapshot.entries.clone()))
        .ok();
    ContextGuard {
        previous,
        _entered: snapshot.span.clone().entered(),
    }
}

/// Empties the MDC of the current scope until the guard is released.
///
/// Entered spans stay current.
pub fn clear() -> ContextGuard {
    let previous = MDC.try_with(|mdc| mdc.take()).ok();
    ContextGuard {
        previous,
        _entered: Span::none().entered(),
    }
}

/// Puts the map that was current before [`restore`] or [`clear`] back.
#[must_use = "dropping the guard immediately reinstates the previous context"]
pub struct ContextGuard {
    previous: Option<Entries>,
    _entered: EnteredSpan,
}

impl ContextGuard {
    pub fn release(self) {}
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let _ = MDC.try_with(|mdc| *mdc.borrow_mut() = previous);
        }
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("previous", &self.previous)
            .finish_non_exhaustive()
    }
}

pub trait MdcFutureExt: Future + Sized {
    /// Runs the future in a new MDC scope holding `snapshot`, instrumented
    /// with the snapshot's span. Writes made inside stay inside.
    fn with_mdc(self, snapshot: Snapshot) -> WithMdc<Self> {
        let Snapshot { entries, span } = snapshot;
        MDC.scope(RefCell::new(entries), self.instrument(span))
    }

    fn with_current_mdc(self) -> WithMdc<Self> {
        self.with_mdc(capture())
    }
}

impl<F: Future> MdcFutureExt for F {}

/// `tokio::spawn` carrying the caller's context into the task.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future.with_current_mdc())
}

/// `tokio::task::spawn_blocking` carrying the caller's context onto the
/// blocking pool thread.
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let snapshot = capture();
    tokio::task::spawn_blocking(move || snapshot.in_scope(f))
}
