//! Tracing configuration with OpenTelemetry support.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LogFormat, TelemetryConfig};

/// Installs the global subscriber: env filter, JSON or pretty output, and an
/// OTLP span exporter when an endpoint is configured.
pub fn init_telemetry(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},diesel=warn,h2=warn,hyper=warn,tower_http=info",
            config.logging.level
        ))
    });

    let otel_layer = create_otel_tracer(&config.telemetry)
        .map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer);

    match config.logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }
}

fn create_otel_tracer(config: &TelemetryConfig) -> Option<sdktrace::Tracer> {
    let endpoint = config.otlp_endpoint.as_ref()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .ok()?;

    let resource = Resource::new(vec![KeyValue::new(
        "service.name",
        config.service_name.clone(),
    )]);

    let provider = sdktrace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer(config.service_name.clone());
    global::set_tracer_provider(provider);

    Some(tracer)
}

pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
