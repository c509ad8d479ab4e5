use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_20000u")]
    pub default_timeout_ms: u64,
    #[serde(default = "d_2")]
    pub max_retries: u32,
    /// Role/alias -> concrete "provider_id/model_name" mapping.
    #[serde(default)]
    pub roles: HashMap<String, RoleConfig>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Per-model-alias pricing: a credits multiplier (drives
    /// `credits_burned`, the wallet debit's source of truth) plus a
    /// dollar-cost rate pair used only for the secondary
    /// `LlmCallEvent.provider_cost_usd` observability field.
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
    /// Label for the pricing snapshot currently in force, stamped onto
    /// every `LlmCallEvent` row written while this config is active.
    #[serde(default = "d_pricing_version")]
    pub pricing_version: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 20_000,
            max_retries: 2,
            roles: HashMap::new(),
            providers: Vec::new(),
            pricing: HashMap::new(),
            pricing_version: d_pricing_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Format: "provider_id/model_name".
    pub model: String,
    #[serde(default)]
    pub require_tools: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    /// Environment variable holding the API key. Resolved at provider
    /// construction time, never stored in config.
    pub api_key_env: String,
    #[serde(default)]
    pub default_model: Option<String>,
}

/// Pricing for a specific model alias: a credits multiplier (the
/// billing-truth field `compute_credits_burned` applies to `oe_tokens`)
/// plus a dollars-per-million input/output rate pair used only for the
/// secondary `provider_cost_usd` observability field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default = "d_multiplier")]
    pub credits_multiplier: f64,
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

impl ModelPricing {
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_1m + output_tokens as f64 * self.output_per_1m)
            / 1_000_000.0
    }
}

fn d_20000u() -> u64 {
    20_000
}
fn d_2() -> u32 {
    2
}
fn d_multiplier() -> f64 {
    1.0
}
fn d_pricing_version() -> String {
    "v1".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_pricing_estimate_cost() {
        let pricing = ModelPricing {
            credits_multiplier: 1.0,
            input_per_1m: 2.50,
            output_per_1m: 10.00,
        };
        let cost = pricing.estimate_cost(1000, 500);
        assert!((cost - 0.0075).abs() < 1e-10);
    }

    #[test]
    fn model_pricing_multiplier_defaults_when_omitted() {
        let json = r#"{ "input_per_1m": 1.0, "output_per_1m": 2.0 }"#;
        let pricing: ModelPricing = serde_json::from_str(json).unwrap();
        assert_eq!(pricing.credits_multiplier, 1.0);
    }

    #[test]
    fn llm_config_default_has_empty_pricing() {
        let config = LlmConfig::default();
        assert!(config.pricing.is_empty());
    }

    #[test]
    fn llm_config_pricing_deserializes() {
        let json = r#"{
            "pricing": {
                "gpt-4o": { "input_per_1m": 2.50, "output_per_1m": 10.00 }
            }
        }"#;
        let config: LlmConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.pricing.len(), 1);
    }
}
