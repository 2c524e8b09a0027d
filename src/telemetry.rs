//! Logging and tracing setup for the broker core.
//!
//! The crate itself only emits `tracing` events; embedding binaries choose how
//! they are rendered by calling [`init_logging`] once at startup.
//!
//! ```rust,no_run
//! use broker_core::telemetry::{LogFormat, init_logging};
//!
//! init_logging(LogFormat::from_env()).expect("Failed to init logging");
//! ```
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
//! - `RUST_LOG`: log level filter (default: `info`)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP collector (default: `http://localhost:4317`)
//! - `OTEL_SERVICE_NAME`: service name on exported spans (default: `broker-core`)
//!
//! # OpenTelemetry (Optional)
//!
//! With the `otel` feature, [`init_telemetry`] installs a subscriber that
//! forwards spans to an OTLP collector in addition to console output.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otel")]
use opentelemetry_sdk::{Resource, runtime, trace as sdktrace};
#[cfg(feature = "otel")]
use tracing_opentelemetry::OpenTelemetryLayer;

const DEFAULT_SERVICE_NAME: &str = "broker-core";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output (default).
    #[default]
    Pretty,
    /// One JSON object per event, for log aggregators.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        })
    }
}

impl LogFormat {
    /// Read from the `LOG_FORMAT` environment variable.
    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .map(|s| s.parse().unwrap_or_default())
            .unwrap_or_default()
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging with the specified format.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(format: LogFormat) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_target(true),
                )
                .try_init()?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(tracing_subscriber::fmt::layer().with_target(true))
                .try_init()?;
        }
    }

    Ok(())
}

/// Configuration for OpenTelemetry export.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to exported spans.
    pub service_name: String,

    /// OTLP endpoint URL.
    pub otlp_endpoint: String,

    /// Log format of the console layer installed next to the exporter.
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string()),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string()),
            log_format: LogFormat::from_env(),
        }
    }
}

/// Initialize tracing with OpenTelemetry export.
///
/// Call once at startup before any spans are created.
#[cfg(feature = "otel")]
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    use opentelemetry::KeyValue;

    let resource = Resource::new(vec![KeyValue::new(
        "service.name",
        config.service_name.clone(),
    )]);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()?;

    let provider = sdktrace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("broker-core");
    opentelemetry::global::set_tracer_provider(provider);

    let otel_layer = OpenTelemetryLayer::new(tracer);

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer().json())
            .with(otel_layer)
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer())
            .with(otel_layer)
            .try_init()?,
    }

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        "OpenTelemetry tracing initialized"
    );

    Ok(())
}

/// Initialize logging only; OpenTelemetry export needs the `otel` feature.
#[cfg(not(feature = "otel"))]
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(config.log_format).map_err(|e| e as Box<dyn std::error::Error>)
}

/// Flush and shut down the OpenTelemetry pipeline.
#[cfg(feature = "otel")]
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
    tracing::info!("OpenTelemetry tracing shut down");
}

/// Shutdown telemetry (no-op when otel feature is disabled).
#[cfg(not(feature = "otel"))]
pub fn shutdown_telemetry() {}

/// Whether spans are exported through OpenTelemetry.
pub const fn is_otel_enabled() -> bool {
    cfg!(feature = "otel")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_default() {
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn test_custom_config() {
        let config = TelemetryConfig {
            service_name: "edge-broker".to_string(),
            otlp_endpoint: "http://collector:4317".to_string(),
            log_format: LogFormat::Json,
        };
        assert_eq!(config.service_name, "edge-broker");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_otel_flag_matches_feature() {
        assert_eq!(is_otel_enabled(), cfg!(feature = "otel"));
    }

    #[test]
    fn test_shutdown_without_init() {
        shutdown_telemetry();
    }
}
