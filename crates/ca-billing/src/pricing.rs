//! Per-model-alias pricing: the credits multiplier that drives
//! `credits_burned` (billing truth) and the dollars-per-million rate
//! pair behind `LlmCallEvent.provider_cost_usd` (observability only,
//! never the source of `credits_burned`).

use std::collections::HashMap;

use ca_domain::config::llm::ModelPricing;

/// A read-only lookup table of per-model-alias pricing, built once from
/// [`ca_domain::config::llm::LlmConfig::pricing`], plus the label of the
/// pricing snapshot currently in force.
#[derive(Debug, Clone)]
pub struct PricingCache {
    table: HashMap<String, ModelPricing>,
    version: String,
}

impl Default for PricingCache {
    fn default() -> Self {
        Self { table: HashMap::new(), version: "v1".into() }
    }
}

impl PricingCache {
    pub fn new(table: HashMap<String, ModelPricing>, version: impl Into<String>) -> Self {
        Self { table, version: version.into() }
    }

    /// Label of the pricing snapshot every `LlmCallEvent` row written
    /// while this cache is active gets stamped with.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Estimate the dollar cost of a call, or `0.0` when the model alias
    /// has no configured pricing row. Missing pricing is never an error:
    /// this field is observability sugar, not billing truth.
    pub fn estimate_cost(&self, model_alias: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.table
            .get(model_alias)
            .map(|p| p.estimate_cost(input_tokens, output_tokens))
            .unwrap_or(0.0)
    }

    /// The credits multiplier for `model_alias`, or `1.0` when the alias
    /// has no configured pricing row. This is the number
    /// `compute_credits_burned` applies to `oe_tokens` — the actual
    /// billing-truth lookup, unlike `estimate_cost` above.
    pub fn get_multiplier(&self, model_alias: &str) -> f64 {
        self.table.get(model_alias).map(|p| p.credits_multiplier).unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_reports_v1() {
        assert_eq!(PricingCache::default().version(), "v1");
    }

    #[test]
    fn missing_pricing_is_zero_cost() {
        let cache = PricingCache::default();
        assert_eq!(cache.estimate_cost("unknown", 1000, 500), 0.0);
    }

    #[test]
    fn configured_pricing_estimates_cost() {
        let mut table = HashMap::new();
        table.insert(
            "gpt-4o".to_string(),
            ModelPricing { credits_multiplier: 1.0, input_per_1m: 2.50, output_per_1m: 10.00 },
        );
        let cache = PricingCache::new(table, "v1");
        let cost = cache.estimate_cost("gpt-4o", 1000, 500);
        assert!((cost - 0.0075).abs() < 1e-10);
    }

    #[test]
    fn missing_pricing_defaults_multiplier_to_one() {
        let cache = PricingCache::default();
        assert_eq!(cache.get_multiplier("unknown"), 1.0);
    }

    #[test]
    fn configured_multiplier_is_looked_up_by_alias() {
        let mut table = HashMap::new();
        table.insert(
            "premium".to_string(),
            ModelPricing { credits_multiplier: 2.5, input_per_1m: 0.0, output_per_1m: 0.0 },
        );
        let cache = PricingCache::new(table, "v1");
        assert_eq!(cache.get_multiplier("premium"), 2.5);
    }
}
