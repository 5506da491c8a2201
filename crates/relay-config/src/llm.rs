use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Model routing configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Backend names used to build the per-tier fallback chains
    #[serde(default)]
    pub tiers: TierConfig,
    /// Primary backend family (Google Generative Language API)
    #[serde(default)]
    pub primary: PrimaryProviderConfig,
    /// Alternate backend family reached only after the primary chain is exhausted
    #[serde(default)]
    pub secondary: Option<SecondaryProviderConfig>,
    /// Bounds on a single request's fallback search
    #[serde(default)]
    pub guard: GuardConfig,
    /// Per-backend circuit breaker thresholds
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Generation parameters and per-attempt timeout
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Token prices keyed by backend name
    #[serde(default)]
    pub pricing: IndexMap<String, ModelPricing>,
}

/// Backend names for the three chain positions
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierConfig {
    /// Highest quality backend, head of the `pro` chain
    #[serde(default = "default_pro_model")]
    pub pro: String,
    /// Fast backend, head of the `flash` and `lite` chains
    #[serde(default = "default_flash_model")]
    pub flash: String,
    /// Terminal element of every chain
    #[serde(default = "default_fallback_model")]
    pub fallback: String,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            pro: default_pro_model(),
            flash: default_flash_model(),
            fallback: default_fallback_model(),
        }
    }
}

/// Google Generative Language API settings
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrimaryProviderConfig {
    /// API key sent in the `x-goog-api-key` header
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
}

/// Anthropic Messages API settings for the secondary provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecondaryProviderConfig {
    /// Model requested from the secondary provider
    pub model: String,
    /// API key; the secondary is unavailable when this is missing or empty
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Maximum tokens to generate (required by the Messages API)
    #[serde(default = "default_secondary_max_tokens")]
    pub max_tokens: u32,
}

/// Cost ceiling for one logical request
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    /// Cumulative spend (currency units) at which the search stops
    #[serde(default = "default_cost_ceiling")]
    pub cost_ceiling: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            cost_ceiling: default_cost_ceiling(),
        }
    }
}

/// Circuit breaker thresholds shared by every backend
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures while closed before the breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Successful probes while half-open before the breaker closes
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Failure count added by a model error or unclassified failure;
    /// quota and overload failures always add one
    #[serde(default = "default_hard_failure_weight")]
    pub hard_failure_weight: u32,
    /// How long an open breaker blocks traffic (e.g. "60s")
    #[serde(default = "default_cooldown")]
    pub cooldown: String,
}

impl CircuitBreakerConfig {
    /// Parsed cool-down duration
    ///
    /// # Errors
    ///
    /// Returns an error if `cooldown` is not a valid duration string
    pub fn cooldown(&self) -> anyhow::Result<Duration> {
        parse_duration("circuit_breaker.cooldown", &self.cooldown)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            hard_failure_weight: default_hard_failure_weight(),
            cooldown: default_cooldown(),
        }
    }
}

/// Generation parameters attached to every outbound payload
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Upper bound for a single backend attempt (e.g. "30s")
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout: String,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Maximum output tokens
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    /// Parsed per-attempt timeout
    ///
    /// # Errors
    ///
    /// Returns an error if `attempt_timeout` is not a valid duration string
    pub fn attempt_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration("generation.attempt_timeout", &self.attempt_timeout)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: default_attempt_timeout(),
            temperature: None,
            max_output_tokens: None,
        }
    }
}

/// Price of one backend, per million tokens
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelPricing {
    /// Cost per million prompt tokens
    pub input_per_mtok: f64,
    /// Cost per million completion tokens
    pub output_per_mtok: f64,
}

fn parse_duration(field: &str, value: &str) -> anyhow::Result<Duration> {
    duration_str::parse(value).map_err(|e| anyhow::anyhow!("invalid duration for {field} '{value}': {e}"))
}

fn default_pro_model() -> String {
    "gemini-2.5-pro".to_owned()
}

fn default_flash_model() -> String {
    "gemini-2.5-flash".to_owned()
}

fn default_fallback_model() -> String {
    "gemini-2.0-flash".to_owned()
}

const fn default_secondary_max_tokens() -> u32 {
    4096
}

const fn default_cost_ceiling() -> f64 {
    0.10
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_success_threshold() -> u32 {
    2
}

const fn default_hard_failure_weight() -> u32 {
    2
}

fn default_cooldown() -> String {
    "60s".to_owned()
}

fn default_attempt_timeout() -> String {
    "30s".to_owned()
}
