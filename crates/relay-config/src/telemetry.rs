use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

/// Telemetry configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name for telemetry metadata
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Additional resource attributes
    #[serde(default)]
    pub resource_attributes: HashMap<String, String>,
    /// Default exporter shared by tracing and metrics
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
    /// Tracing-specific configuration
    #[serde(default)]
    pub tracing: Option<TracingConfig>,
    /// Metrics-specific configuration
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl TelemetryConfig {
    /// Exporter used for metrics, falling back to the shared one
    pub fn metrics_exporter(&self) -> Option<&ExporterConfig> {
        self.metrics
            .as_ref()
            .and_then(|m| m.exporter.as_ref())
            .or(self.exporter.as_ref())
    }

    /// Exporter used for traces, falling back to the shared one
    pub fn tracing_exporter(&self) -> Option<&ExporterConfig> {
        self.tracing
            .as_ref()
            .and_then(|t| t.exporter.as_ref())
            .or(self.exporter.as_ref())
    }
}

/// OTLP exporter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    /// OTLP endpoint URL
    pub endpoint: Url,
    /// Export protocol
    #[serde(default)]
    pub protocol: ExportProtocol,
    /// Metrics export interval in seconds
    #[serde(default = "default_export_interval")]
    pub export_interval_secs: u64,
}

/// OTLP export protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportProtocol {
    /// gRPC (default)
    #[default]
    Grpc,
    /// HTTP/protobuf
    HttpProto,
}

/// Tracing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TracingConfig {
    /// Sampling rate (0.0 to 1.0)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    /// Use parent-based sampler
    #[serde(default = "default_true")]
    pub parent_based: bool,
    /// Override the default exporter for tracing
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Override the default exporter for metrics
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
}

fn default_service_name() -> String {
    "relay".to_owned()
}

const fn default_export_interval() -> u64 {
    30
}

#[allow(clippy::missing_const_for_fn)]
fn default_sampling_rate() -> f64 {
    1.0
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}
