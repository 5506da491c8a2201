use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration from raw TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_tiers()?;
        self.validate_limits()?;
        self.validate_pricing()?;
        Ok(())
    }

    /// Every chain position needs a backend name
    fn validate_tiers(&self) -> anyhow::Result<()> {
        let tiers = &self.llm.tiers;

        for (position, name) in [("pro", &tiers.pro), ("flash", &tiers.flash), ("fallback", &tiers.fallback)] {
            if name.trim().is_empty() {
                anyhow::bail!("llm.tiers.{position} must not be empty");
            }
        }

        if let Some(secondary) = &self.llm.secondary
            && secondary.model.trim().is_empty()
        {
            anyhow::bail!("llm.secondary.model must not be empty");
        }

        Ok(())
    }

    /// Thresholds, ceiling, and durations must be usable
    fn validate_limits(&self) -> anyhow::Result<()> {
        let breaker = &self.llm.circuit_breaker;

        if breaker.failure_threshold == 0 {
            anyhow::bail!("llm.circuit_breaker.failure_threshold must be at least 1");
        }

        if breaker.success_threshold == 0 {
            anyhow::bail!("llm.circuit_breaker.success_threshold must be at least 1");
        }

        if breaker.hard_failure_weight == 0 {
            anyhow::bail!("llm.circuit_breaker.hard_failure_weight must be at least 1");
        }

        if breaker.cooldown()?.is_zero() {
            anyhow::bail!("llm.circuit_breaker.cooldown must be greater than zero");
        }

        if self.llm.generation.attempt_timeout()?.is_zero() {
            anyhow::bail!("llm.generation.attempt_timeout must be greater than zero");
        }

        let ceiling = self.llm.guard.cost_ceiling;
        if !ceiling.is_finite() || ceiling <= 0.0 {
            anyhow::bail!("llm.guard.cost_ceiling must be a positive number, got {ceiling}");
        }

        Ok(())
    }

    fn validate_pricing(&self) -> anyhow::Result<()> {
        for (model, price) in &self.llm.pricing {
            let valid = |v: f64| v.is_finite() && v >= 0.0;
            if !valid(price.input_per_mtok) || !valid(price.output_per_mtok) {
                anyhow::bail!("llm.pricing.\"{model}\" prices must be non-negative numbers");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Config;

    #[test]
    fn empty_config_is_valid() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.llm.tiers.flash, "gemini-2.5-flash");
        assert!(config.telemetry.is_none());
    }

    #[test]
    fn env_placeholders_feed_secrets() {
        temp_env::with_var("RELAY_LOADER_KEY", Some("secret"), || {
            let raw = "[llm.secondary]\nmodel = \"claude\"\napi_key = \"{{ env.RELAY_LOADER_KEY }}\"\n";
            let config = Config::parse(raw).unwrap();
            assert!(config.llm.secondary.is_some());
        });
    }

    #[test]
    fn empty_tier_name_fails() {
        let err = Config::parse("[llm.tiers]\nflash = \" \"\n").unwrap_err();
        assert!(err.to_string().contains("llm.tiers.flash"));
    }

    #[test]
    fn zero_threshold_fails() {
        let err = Config::parse("[llm.circuit_breaker]\nfailure_threshold = 0\n").unwrap_err();
        assert!(err.to_string().contains("failure_threshold"));
    }

    #[test]
    fn zero_hard_failure_weight_fails() {
        let err = Config::parse("[llm.circuit_breaker]\nhard_failure_weight = 0\n").unwrap_err();
        assert!(err.to_string().contains("hard_failure_weight"));
    }

    #[test]
    fn non_positive_ceiling_fails() {
        let err = Config::parse("[llm.guard]\ncost_ceiling = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("cost_ceiling"));
    }

    #[test]
    fn bad_timeout_fails() {
        assert!(Config::parse("[llm.generation]\nattempt_timeout = \"whenever\"\n").is_err());
    }

    #[test]
    fn negative_price_fails() {
        let raw = "[llm.pricing.\"m\"]\ninput_per_mtok = -1.0\noutput_per_mtok = 1.0\n";
        let err = Config::parse(raw).unwrap_err();
        assert!(err.to_string().contains("llm.pricing"));
    }
}
