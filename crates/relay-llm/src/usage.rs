use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashSet;
use indexmap::IndexMap;
use relay_config::ModelPricing;

use crate::metrics::MetricsSink;
use crate::types::{TokenUsage, UsageRecord};

const TOKENS_PER_PRICE_UNIT: f64 = 1_000_000.0;

/// Per-backend token prices
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    prices: HashMap<String, ModelPricing>,
}

impl PriceTable {
    pub fn new(prices: &IndexMap<String, ModelPricing>) -> Self {
        Self {
            prices: prices.iter().map(|(name, price)| (name.clone(), *price)).collect(),
        }
    }

    pub fn get(&self, backend: &str) -> Option<ModelPricing> {
        self.prices.get(backend).copied()
    }
}

/// Turns reported token counts into usage records and cost
pub struct UsageAccountant {
    prices: PriceTable,
    metrics: Arc<dyn MetricsSink>,
    /// Backends already reported as missing from the price table
    unpriced: DashSet<String>,
}

impl UsageAccountant {
    pub fn new(prices: PriceTable, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            prices,
            metrics,
            unpriced: DashSet::new(),
        }
    }

    /// Cost of `usage` on `backend`; zero when either is unknown
    #[allow(clippy::cast_precision_loss)]
    pub fn cost(&self, backend: &str, usage: Option<&TokenUsage>) -> f64 {
        let Some(usage) = usage else {
            return 0.0;
        };

        let Some(price) = self.prices.get(backend) else {
            if self.unpriced.insert(backend.to_owned()) {
                tracing::debug!(backend, "no price configured, treating usage as free");
            }
            return 0.0;
        };

        (usage.prompt_tokens as f64 * price.input_per_mtok + usage.completion_tokens as f64 * price.output_per_mtok)
            / TOKENS_PER_PRICE_UNIT
    }

    /// Build the usage record of a successful call and report it
    pub fn account(&self, backend: &str, usage: Option<TokenUsage>) -> UsageRecord {
        let tokens = usage.unwrap_or_default();

        let record = UsageRecord {
            prompt_tokens: tokens.prompt_tokens,
            completion_tokens: tokens.completion_tokens,
            total_tokens: tokens.total(),
            cost: self.cost(backend, usage.as_ref()),
            backend: backend.to_owned(),
        };

        self.metrics.usage(&record);
        record
    }

    pub fn record_fallback(&self, from: &str, to: &str) {
        tracing::info!(from, to, "falling back to next backend");
        self.metrics.fallback(from, to);
    }
}
