//! Helpers shared by unit and integration tests.

use std::sync::Once;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt as _;

/// Installs a global subscriber with an OpenTelemetry layer backed by an SDK
/// tracer provider, once per process, so `tracing` spans get real ids.
/// Nothing is exported.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let provider = SdkTracerProvider::builder().build();
        let subscriber = tracing_subscriber::registry()
            .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("sqs-send-receive-tests")));
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
