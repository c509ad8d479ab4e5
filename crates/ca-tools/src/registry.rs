//! The fixed tool set every agent may be granted: `search` and
//! `file_read`. There is no dynamic tool registration — SPEC_FULL.md
//! names exactly these two.

use ca_domain::model::ActiveAgent;
use ca_domain::tool::ToolDefinition;

pub const SEARCH: &str = "search";
pub const FILE_READ: &str = "file_read";

fn search_definition() -> ToolDefinition {
    ToolDefinition {
        name: SEARCH.into(),
        description: "Search the web for current information and recent facts.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query." }
            },
            "required": ["query"]
        }),
    }
}

fn file_read_definition() -> ToolDefinition {
    ToolDefinition {
        name: FILE_READ.into(),
        description: "Read an uploaded file by file id and return parsed content.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "file_id": { "type": "string", "description": "The ID of the file to read." }
            },
            "required": ["file_id"]
        }),
    }
}

/// Build the tool definitions an agent may see, filtered to its
/// permitted tool names.
pub fn build_tool_definitions(agent: &ActiveAgent) -> Vec<ToolDefinition> {
    let mut defs = Vec::new();
    if agent.is_permitted(SEARCH) {
        defs.push(search_definition());
    }
    if agent.is_permitted(FILE_READ) {
        defs.push(file_read_definition());
    }
    defs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_with(tools: &[&str]) -> ActiveAgent {
        ActiveAgent {
            agent_id: None,
            agent_key: None,
            name: "a".into(),
            model_alias: "default".into(),
            role_prompt: String::new(),
            tool_permissions: tools.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn only_permitted_tools_are_offered() {
        let agent = agent_with(&["search"]);
        let defs = build_tool_definitions(&agent);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "search");
    }

    #[test]
    fn no_permissions_means_no_tools() {
        let agent = agent_with(&[]);
        assert!(build_tool_definitions(&agent).is_empty());
    }
}
