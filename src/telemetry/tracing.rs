//! Log output and optional OTLP trace export.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LogFormat, TelemetryConfig};

/// Installs the global subscriber. `RUST_LOG` wins over `LOG_LEVEL` when set.
pub fn init_telemetry(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let otel_layer =
        create_otel_tracer(&config.telemetry).map(|t| tracing_opentelemetry::layer().with_tracer(t));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer);

    let result = match config.logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("Tracing subscriber already installed: {}", e);
    }
}

fn create_otel_tracer(config: &TelemetryConfig) -> Option<sdktrace::Tracer> {
    let endpoint = config.otlp_endpoint.as_ref()?;

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("OTLP exporter disabled: {}", e);
            return None;
        }
    };

    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    let provider = sdktrace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("boardroom");
    global::set_tracer_provider(provider);

    Some(tracer)
}

pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_otel_tracer_without_endpoint() {
        let config = TelemetryConfig {
            otlp_endpoint: None,
            service_name: "boardroom-test".to_string(),
            metrics_enabled: false,
        };

        assert!(create_otel_tracer(&config).is_none());
    }
}
