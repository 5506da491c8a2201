//! Router configuration for tests

use relay_config::{LlmConfig, ModelPricing};

pub const PRO: &str = "gemini-2.5-pro";
pub const FLASH: &str = "gemini-2.5-flash";
pub const FALLBACK: &str = "gemini-2.0-flash";

/// Builder over [`LlmConfig`] with test-friendly defaults
pub struct ConfigBuilder {
    config: LlmConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = LlmConfig::default();
        config.generation.attempt_timeout = "5s".to_owned();
        Self { config }
    }

    pub fn with_cost_ceiling(mut self, ceiling: f64) -> Self {
        self.config.guard.cost_ceiling = ceiling;
        self
    }

    pub fn with_breaker(mut self, failure_threshold: u32, success_threshold: u32, cooldown: &str) -> Self {
        self.config.circuit_breaker.failure_threshold = failure_threshold;
        self.config.circuit_breaker.success_threshold = success_threshold;
        cooldown.clone_into(&mut self.config.circuit_breaker.cooldown);
        self
    }

    pub fn with_hard_failure_weight(mut self, weight: u32) -> Self {
        self.config.circuit_breaker.hard_failure_weight = weight;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: &str) -> Self {
        timeout.clone_into(&mut self.config.generation.attempt_timeout);
        self
    }

    /// Price per million tokens for `model`
    pub fn with_price(mut self, model: &str, input_per_mtok: f64, output_per_mtok: f64) -> Self {
        self.config.pricing.insert(
            model.to_owned(),
            ModelPricing {
                input_per_mtok,
                output_per_mtok,
            },
        );
        self
    }

    pub fn build(self) -> LlmConfig {
        self.config
    }
}
