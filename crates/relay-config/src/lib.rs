//! Configuration for the Relay model-routing gateway
//!
//! Loaded from a TOML file with `{{ env.VAR }}` placeholder expansion.

#![allow(clippy::must_use_candidate)]

mod env;
pub mod llm;
mod loader;
pub mod telemetry;

use serde::Deserialize;

pub use llm::*;
pub use telemetry::{ExportProtocol, ExporterConfig, TelemetryConfig};

/// Top-level Relay configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Model routing configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
