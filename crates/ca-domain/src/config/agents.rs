use serde::{Deserialize, Serialize};

use crate::model::RoomMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_key: String,
    pub name: String,
    pub model_alias: String,
    pub role_prompt: String,
    #[serde(default)]
    pub tool_permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub mode: RoomMode,
    /// Agent keys, in invocation order for manual/roundtable modes.
    pub agent_keys: Vec<String>,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "d_manager_alias")]
    pub manager_model_alias: String,
    #[serde(default = "d_3")]
    pub max_depth: u32,
    #[serde(default = "d_9")]
    pub max_specialist_invocations: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            manager_model_alias: d_manager_alias(),
            max_depth: 3,
            max_specialist_invocations: 9,
        }
    }
}

fn d_manager_alias() -> String {
    "manager".into()
}
fn d_3() -> u32 {
    3
}
fn d_9() -> u32 {
    9
}
