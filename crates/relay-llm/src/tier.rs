use relay_config::TierConfig;
use serde::Serialize;
use strum::{Display, EnumString};

/// Quality/latency class requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTier {
    Flash,
    Lite,
    Pro,
    Fallback,
}

/// Maps each tier to its ordered backend chain
///
/// Chains are built once and never change.
#[derive(Debug, Clone)]
pub struct ChainResolver {
    pro: Vec<String>,
    flash: Vec<String>,
    fallback: Vec<String>,
}

impl ChainResolver {
    pub fn new(tiers: &TierConfig) -> Self {
        Self {
            pro: vec![tiers.pro.clone(), tiers.flash.clone(), tiers.fallback.clone()],
            flash: vec![tiers.flash.clone(), tiers.fallback.clone()],
            fallback: vec![tiers.fallback.clone()],
        }
    }

    /// Ordered backends for a tier; the last element is always the fallback backend
    pub fn resolve(&self, tier: ServiceTier) -> &[String] {
        match tier {
            ServiceTier::Pro => &self.pro,
            ServiceTier::Flash | ServiceTier::Lite => &self.flash,
            ServiceTier::Fallback => &self.fallback,
        }
    }

    /// Every backend that appears in some chain, in first-seen order
    pub fn distinct_backends(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::with_capacity(self.pro.len());

        for name in self.pro.iter().chain(&self.flash).chain(&self.fallback) {
            if !seen.contains(name) {
                seen.push(name.clone());
            }
        }

        seen
    }
}
