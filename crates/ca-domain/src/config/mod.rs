//! Layered configuration, following this codebase's `#[serde(default =
//! "fn_name")]` convention: every field has an explicit, named default so a
//! partial JSON config document and an empty one both deserialize cleanly.

mod agents;
pub mod llm;
mod quota;

pub use agents::{AgentConfig, OrchestratorConfig, RoomConfig};
pub use llm::{LlmConfig, ModelPricing, ProviderConfig, RoleConfig};
pub use quota::{QuotaConfig, QuotaOverride};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub rooms: HashMap<String, RoomConfig>,
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
}

/// Budget math and summarize/prune triggers for [`ca_context`'s
/// `ContextPlanner`](../../ca_context/struct.ContextPlanner.html).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "d_2048")]
    pub max_output_tokens: usize,
    #[serde(default = "d_070")]
    pub summary_trigger_ratio: f64,
    #[serde(default = "d_090")]
    pub prune_trigger_ratio: f64,
    #[serde(default = "d_8")]
    pub mandatory_summary_turn: u32,
    #[serde(default = "d_4")]
    pub recent_turns_to_keep: usize,
    #[serde(default = "d_8192")]
    pub default_model_context_limit: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 2_048,
            summary_trigger_ratio: 0.70,
            prune_trigger_ratio: 0.90,
            mandatory_summary_turn: 8,
            recent_turns_to_keep: 4,
            default_model_context_limit: 8_192,
        }
    }
}

fn d_2048() -> usize {
    2_048
}
fn d_070() -> f64 {
    0.70
}
fn d_090() -> f64 {
    0.90
}
fn d_8() -> u32 {
    8
}
fn d_4() -> usize {
    4
}
fn d_8192() -> usize {
    8_192
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_config_defaults_when_absent() {
        let json = r#"{}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.context.mandatory_summary_turn, 8);
        assert!((config.context.summary_trigger_ratio - 0.70).abs() < 1e-10);
    }

    #[test]
    fn context_config_partial_override() {
        let json = r#"{"context": {"recent_turns_to_keep": 10}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.context.recent_turns_to_keep, 10);
        assert_eq!(config.context.mandatory_summary_turn, 8);
    }
}
