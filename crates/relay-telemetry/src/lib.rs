//! Telemetry for Relay
//!
//! Structured logging through `tracing`, with optional OTLP export of
//! traces and metrics

mod metadata;
pub mod metrics;

use std::time::Duration;

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use relay_config::{ExportProtocol, ExporterConfig, TelemetryConfig};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt};

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

/// Instrumentation scope for every Relay instrument
const SCOPE: &str = "relay";

/// Meter for Relay instruments
///
/// Backed by the global meter provider, so instruments created before
/// [`init`] runs, or without an exporter, are no-ops.
pub fn meter() -> Meter {
    global::meter(SCOPE)
}

/// Holds exporter providers and shuts them down on drop
pub struct TelemetryGuard {
    meter_provider: Option<SdkMeterProvider>,
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Force flush all pending metrics immediately
    ///
    /// # Errors
    ///
    /// Returns an error if the meter provider fails to flush
    pub fn force_flush(&self) -> anyhow::Result<()> {
        if let Some(ref provider) = self.meter_provider {
            provider
                .force_flush()
                .map_err(|e| anyhow::anyhow!("failed to flush metrics: {e}"))?;
        }
        Ok(())
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.meter_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown meter provider: {e}");
        }
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown tracer provider: {e}");
        }
    }
}

/// Initialize logging and, when configured, OTLP export
///
/// Returns a guard that must be held for the lifetime of the process.
///
/// # Errors
///
/// Returns an error if an OTLP exporter cannot be built
pub fn init(config: Option<&TelemetryConfig>, log_filter: &str) -> anyhow::Result<TelemetryGuard> {
    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let mut guard = TelemetryGuard {
        meter_provider: None,
        tracer_provider: None,
    };

    let Some(config) = config else {
        tracing_subscriber::registry().with(filter).with(fmt_layer()).init();
        return Ok(guard);
    };

    let resource = metadata::build_resource(config);

    if let Some(exporter) = config.metrics_exporter() {
        let provider = init_metrics(exporter, resource.clone())?;
        global::set_meter_provider(provider.clone());
        guard.meter_provider = Some(provider);
    }

    let otel_layer = match config.tracing_exporter() {
        Some(exporter) => {
            let provider = init_tracer(config, exporter, resource)?;
            let tracer = provider.tracer(SCOPE);
            global::set_tracer_provider(provider.clone());
            guard.tracer_provider = Some(provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer())
        .with(otel_layer)
        .init();

    Ok(guard)
}

fn fmt_layer<S>() -> tracing_subscriber::fmt::Layer<S>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Periodic OTLP metric export
fn init_metrics(exporter: &ExporterConfig, resource: opentelemetry_sdk::Resource) -> anyhow::Result<SdkMeterProvider> {
    use opentelemetry_otlp::{MetricExporter, WithExportConfig};
    use opentelemetry_sdk::metrics::PeriodicReader;

    let endpoint = exporter.endpoint.as_str();
    let built = match exporter.protocol {
        ExportProtocol::Grpc => MetricExporter::builder().with_tonic().with_endpoint(endpoint).build(),
        ExportProtocol::HttpProto => MetricExporter::builder().with_http().with_endpoint(endpoint).build(),
    }
    .map_err(|e| anyhow::anyhow!("failed to build metrics exporter for {endpoint}: {e}"))?;

    let reader = PeriodicReader::builder(built)
        .with_interval(Duration::from_secs(exporter.export_interval_secs))
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

/// Batched OTLP span export with ratio sampling
fn init_tracer(
    config: &TelemetryConfig,
    exporter: &ExporterConfig,
    resource: opentelemetry_sdk::Resource,
) -> anyhow::Result<SdkTracerProvider> {
    use opentelemetry_otlp::{SpanExporter, WithExportConfig};
    use opentelemetry_sdk::trace::Sampler;

    let endpoint = exporter.endpoint.as_str();
    let built = match exporter.protocol {
        ExportProtocol::Grpc => SpanExporter::builder().with_tonic().with_endpoint(endpoint).build(),
        ExportProtocol::HttpProto => SpanExporter::builder().with_http().with_endpoint(endpoint).build(),
    }
    .map_err(|e| anyhow::anyhow!("failed to build span exporter for {endpoint}: {e}"))?;

    let sampling_rate = config.tracing.as_ref().map_or(1.0, |t| t.sampling_rate);
    let sampler = if sampling_rate >= 1.0 {
        Sampler::AlwaysOn
    } else if sampling_rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(sampling_rate)
    };

    let sampler = if config.tracing.as_ref().is_none_or(|t| t.parent_based) {
        Sampler::ParentBased(Box::new(sampler))
    } else {
        sampler
    };

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(sampler)
        .with_batch_exporter(built)
        .build())
}
