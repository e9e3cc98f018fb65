//! Logging and OpenTelemetry initialization.
//!
//! Logs always go to stderr. With an OTLP endpoint configured, spans,
//! metrics and log records are exported there as well.

pub mod metrics;
pub mod work;

use crate::error::{Error, Result};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

/// How the runner reports what it is doing.
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint, e.g. "http://localhost:4317".
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset ("info", "bootstrap_runner=debug").
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            endpoint: None,
            service_name: service_name.into(),
            default_filter: "info".to_string(),
        }
    }
}

/// The three OTLP pipelines, built together against one endpoint.
struct Providers {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl Providers {
    fn connect(endpoint: &str, service_name: String) -> Result<Self> {
        use opentelemetry_otlp::WithExportConfig as _;

        let resource = Resource::builder()
            .with_service_name(service_name)
            .with_attribute(opentelemetry::KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            ))
            .build();

        let spans = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("span", e))?;
        let metrics = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("metric", e))?;
        let logs = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("log", e))?;

        Ok(Self {
            tracer: SdkTracerProvider::builder()
                .with_batch_exporter(spans)
                .with_resource(resource.clone())
                .build(),
            meter: SdkMeterProvider::builder()
                .with_periodic_exporter(metrics)
                .with_resource(resource.clone())
                .build(),
            logger: SdkLoggerProvider::builder()
                .with_batch_exporter(logs)
                .with_resource(resource)
                .build(),
        })
    }

    /// Reverse of construction order.
    fn shutdown(self) {
        let _ = self.logger.shutdown();
        let _ = self.meter.shutdown();
        let _ = self.tracer.shutdown();
    }
}

fn exporter_error(signal: &str, e: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to create OTLP {signal} exporter: {e}"))
}

/// Keeps the export pipelines alive. Dropping it flushes and shuts them down.
pub struct TelemetryGuard {
    providers: Option<Providers>,
}

impl TelemetryGuard {
    pub fn is_exporting(&self) -> bool {
        self.providers.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(providers) = self.providers.take() {
            providers.shutdown();
        }
    }
}

/// Install the global tracing subscriber and, if configured, the OTLP
/// exporters and global meter provider.
///
/// # Errors
///
/// Fails on an unparseable filter, an exporter that cannot be built, or
/// when a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| Error::Config(format!("bad log filter {:?}: {e}", config.default_filter)))?;

    let providers = config
        .endpoint
        .as_deref()
        .map(|endpoint| Providers::connect(endpoint, config.service_name.clone()))
        .transpose()?;
    if let Some(p) = &providers {
        opentelemetry::global::set_meter_provider(p.meter.clone());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .with(
            providers.as_ref().map(|p| {
                tracing_opentelemetry::layer().with_tracer(p.tracer.tracer("bootstrap-runner"))
            }),
        )
        .with(providers.as_ref().map(|p| {
            opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&p.logger)
        }))
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    Ok(TelemetryGuard { providers })
}
