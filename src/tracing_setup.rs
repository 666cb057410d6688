//! Structured logging and OTLP trace export.
//!
//! The subscriber is assembled from the `logging` configuration section
//! (level + JSON or pretty output) with an optional OpenTelemetry layer
//! exporting spans over OTLP gRPC to the endpoint named by the
//! `opentelemetry` section. The exported resource identifies the gateway as
//! `service.name = "fcg-gateway"` with the crate version attached.
use eyre::{Result, WrapErr};
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, propagation::TraceContextPropagator, trace::SdkTracerProvider,
};
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig, OpenTelemetryConfig, SERVICE_NAME};

/// Keeps the tracer provider alive for the lifetime of the process and
/// flushes pending spans on shutdown.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Flush and shut down the exporter. Safe to call when OTLP export was
    /// disabled.
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!("Failed to shut down tracer provider cleanly: {e}");
        }
    }
}

/// Initialize the tracing subscriber and, unless disabled, the OTLP span
/// exporter. Must be called exactly once, before any request is served.
pub fn init_telemetry(
    logging: &LoggingConfig,
    opentelemetry: &OpenTelemetryConfig,
) -> Result<TelemetryGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .wrap_err_with(|| format!("Invalid log level: {}", logging.level))?;

    let tracer_provider = if opentelemetry.enabled {
        Some(build_tracer_provider(&opentelemetry.otlp_endpoint)?)
    } else {
        None
    };

    let tracer = tracer_provider
        .as_ref()
        .map(|provider| provider.tracer(SERVICE_NAME));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match logging.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .with(tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t)))
            .init(),
        LogFormat::Pretty => Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .with(tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t)))
            .init(),
    }

    if opentelemetry.enabled {
        global::set_text_map_propagator(TraceContextPropagator::new());
        tracing::info!(
            endpoint = %opentelemetry.otlp_endpoint,
            "OTLP trace export enabled"
        );
    }

    Ok(TelemetryGuard { tracer_provider })
}

fn build_tracer_provider(endpoint: &str) -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.to_string())
        .build()
        .wrap_err_with(|| format!("Failed to build OTLP span exporter for {endpoint}"))?;

    let resource = Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_attribute(KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")))
        .build();

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

/// Create a request-scoped tracing span.
pub fn request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = %method,
        http.path = %path,
        request.id = %request_id,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Create a span covering one forwarded upstream request.
pub fn upstream_span(cluster: &str, destination: &str, method: &str, path: &str) -> tracing::Span {
    tracing::info_span!(
        "upstream_request",
        proxy.cluster = %cluster,
        proxy.destination = %destination,
        http.method = %method,
        http.path = %path,
        http.status_code = tracing::field::Empty,
    )
}
