//! Logging and tracing setup.
//!
//! Log lines go through `tracing-subscriber`'s fmt layer, prefixed with the
//! current MDC by [`MdcFormat`]. Spans go to an OpenTelemetry tracer
//! provider, which exports to Datadog when enabled and otherwise only hands
//! out ids.

use std::fmt::{self, Write as _};

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::mdc;

/// Configuration for telemetry initialization.
pub struct TelemetryConfig {
    /// The service name reported with spans, also the tracer name.
    pub service_name: String,
    /// Export spans through `datadog-opentelemetry`.
    pub datadog: bool,
}

impl From<&AppConfig> for TelemetryConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            service_name: config.service_name.clone(),
            datadog: config.datadog_tracing,
        }
    }
}

/// Guard that shuts down the tracer provider on drop.
///
/// Must be held for the lifetime of the application.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            let _ = provider.shutdown();
        }
    }
}

/// Initialize logging and tracing.
///
/// # Errors
///
/// Returns an error if a global tracing subscriber is already set.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let tracer_provider = if config.datadog {
        datadog_opentelemetry::tracing()
            .with_config(
                datadog_opentelemetry::configuration::Config::builder()
                    .set_service(config.service_name.clone())
                    .build(),
            )
            .init()
    } else {
        SdkTracerProvider::builder().build()
    };
    opentelemetry::global::set_tracer_provider(tracer_provider.clone());

    let otel_trace_layer =
        tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer(config.service_name));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(MdcFormat::new(tracing_subscriber::fmt::format().with_target(false))),
        )
        .with(otel_trace_layer)
        .try_init()
        .map_err(|e| Error::Telemetry(e.to_string()))?;

    Ok(TelemetryGuard {
        tracer_provider: Some(tracer_provider),
    })
}

/// Event formatter that prefixes each line with the MDC of the task
/// emitting it, e.g. `[spanId=00f067aa0ba902b7 traceId=4bf9…] `.
#[derive(Debug, Clone)]
pub struct MdcFormat<F> {
    inner: F,
}

impl<F> MdcFormat<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<S, N, F> FormatEvent<S, N> for MdcFormat<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let prefix = mdc::with_entries(render_entries).unwrap_or_default();
        if !prefix.is_empty() {
            writer.write_str(&prefix)?;
        }
        self.inner.format_event(ctx, writer, event)
    }
}

fn render_entries(entries: &std::collections::BTreeMap<String, String>) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let mut rendered = String::from("[");
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            rendered.push(' ');
        }
        let _ = write!(rendered, "{key}={value}");
    }
    rendered.push_str("] ");
    rendered
}
