//! Core conversational-backend vocabulary shared by every crate in the
//! workspace: room modes, message visibility, and turn status.

use serde::{Deserialize, Serialize};

/// How a room dispatches a turn across its member agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomMode {
    Manual,
    Tag,
    Roundtable,
    Orchestrator,
    Standalone,
}

/// Whether a message is visible to the whole room or only to the agent
/// that produced it (e.g. private scratch turns in multi-agent rooms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Shared,
    Private,
}

/// Terminal (or in-flight) status of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Running,
    Partial,
    Completed,
    Failed,
}

/// A room member available for invocation during a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveAgent {
    pub agent_id: Option<String>,
    pub agent_key: Option<String>,
    pub name: String,
    pub model_alias: String,
    pub role_prompt: String,
    /// Normalized (trimmed, lowercased) tool names this agent may call.
    pub tool_permissions: Vec<String>,
}

impl ActiveAgent {
    pub fn is_permitted(&self, tool_name: &str) -> bool {
        let normalized = tool_name.trim().to_lowercase();
        !normalized.is_empty() && self.tool_permissions.contains(&normalized)
    }
}

/// Normalize a raw tool-permission list the way agents declare them: trim,
/// lowercase, drop blanks.
pub fn normalize_tool_permissions(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
