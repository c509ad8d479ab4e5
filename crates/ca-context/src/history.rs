//! Builds the flattened, role-tagged history a [`crate::planner::ContextPlanner`]
//! budgets and trims, from the raw persisted message/tool-call rows.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use ca_domain::model::Visibility;

/// The three roles a context message can carry. Distinct from
/// [`ca_domain::tool::Role`]: tool-result messages never reach the
/// planner directly, they are folded into an assistant-role history
/// entry or a synthesized tool-memory block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextRole {
    System,
    User,
    Assistant,
}

/// One line in the prompt sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: ContextRole,
    pub content: String,
}

impl ContextMessage {
    pub fn new(role: ContextRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

/// A persisted message row, as needed to build history. A narrower view
/// of `Message` than the full persistence row — only the fields the
/// planner's visibility/name-tag logic reads.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub turn_id: Option<String>,
    pub role: String,
    pub visibility: Visibility,
    pub agent_key: Option<String>,
    pub source_agent_key: Option<String>,
    pub agent_name: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A unified, already-role-mapped history entry ready for budgeting.
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub id: String,
    pub role: ContextRole,
    pub content: String,
    pub turn_id: Option<String>,
}

/// A persisted tool-call row, as needed to build a tool-memory block.
#[derive(Debug, Clone)]
pub struct ToolCallRow {
    pub tool_name: String,
    pub tool_input_json: String,
    pub tool_output_json: String,
    pub created_at: DateTime<Utc>,
}

static NAME_TAG_BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[.*?\]:\s*").unwrap());
static NAME_TAG_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\s]{2,20}:\s*").unwrap());

/// Build a unified [`HistoryMessage`] list from persisted message rows.
///
/// In a solo (non-room) session, only shared messages are included. In a
/// room, every row is merged in chronological order, except when
/// `current_agent_key` is given: then private rows belonging to a
/// different agent are dropped, and this agent's own private rows are
/// capped at the most recent `agent_private_turns_keep` pairs so one
/// agent's scratch history never crowds out the shared timeline.
///
/// Assistant messages get any leading `[Name]:` or `Name:` tag stripped,
/// then — in room mode, for shared assistant output — re-tagged with the
/// producing agent's name so the remaining agents can tell who said what.
pub fn build_history_messages(
    history_rows: &[MessageRow],
    is_room: bool,
    current_agent_key: Option<&str>,
    agent_private_turns_keep: u32,
) -> Vec<HistoryMessage> {
    let combined: Vec<&MessageRow> = if is_room {
        if let Some(current_key) = current_agent_key {
            let mut shared: Vec<&MessageRow> = history_rows
                .iter()
                .filter(|r| r.visibility == Visibility::Shared)
                .collect();
            let mut private: Vec<&MessageRow> = history_rows
                .iter()
                .filter(|r| {
                    r.visibility == Visibility::Private
                        && r.agent_key.as_deref() == Some(current_key)
                })
                .collect();
            let private_limit = (agent_private_turns_keep as usize) * 2;
            if private_limit > 0 && private.len() > private_limit {
                private = private.split_off(private.len() - private_limit);
            }
            shared.append(&mut private);
            shared.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
            shared
        } else {
            let mut combined: Vec<&MessageRow> = history_rows.iter().collect();
            combined.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
            combined
        }
    } else {
        history_rows.iter().filter(|r| r.visibility == Visibility::Shared).collect()
    };

    let mut output = Vec::with_capacity(combined.len());
    for msg in combined {
        let role = match msg.role.as_str() {
            "user" => ContextRole::User,
            "assistant" | "tool" => ContextRole::Assistant,
            _ => continue,
        };

        let mut content = msg.content.clone();
        if msg.role == "assistant" {
            content = NAME_TAG_BRACKET.replace(&content, "").into_owned();
            content = NAME_TAG_PREFIX.replace(&content, "").into_owned();
        }

        if is_room && msg.role == "assistant" && msg.visibility == Visibility::Shared {
            let label = msg.agent_name.clone().or_else(|| msg.source_agent_key.clone());
            if let Some(label) = label {
                let is_other_agent = current_agent_key
                    .zip(msg.source_agent_key.as_deref())
                    .is_some_and(|(current, source)| source != current);
                content = if is_other_agent || current_agent_key.is_none() {
                    format!("[{label}]: {content}")
                } else {
                    format!("{label}: {content}")
                };
            }
        }

        output.push(HistoryMessage {
            id: msg.id.clone(),
            role,
            content,
            turn_id: msg.turn_id.clone(),
        });
    }
    output
}

/// Summarize an agent's most recent tool calls into one compact text
/// block, or `None` when there is nothing to report (so callers can skip
/// the message entirely rather than emit an empty one).
pub fn build_tool_memory_block(tool_events: &[ToolCallRow], max_events: usize) -> Option<String> {
    if tool_events.is_empty() {
        return None;
    }

    let start = tool_events.len().saturating_sub(max_events);
    let mut lines = Vec::new();
    for evt in &tool_events[start..] {
        let args_short = match serde_json::from_str::<serde_json::Value>(&evt.tool_input_json) {
            Ok(serde_json::Value::Object(map)) => map
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", "),
            _ => truncate_chars(&evt.tool_input_json, 80),
        };

        let output_snippet = truncate_chars(&evt.tool_output_json, 200);
        lines.push(format!("- {}({}) -> {}", evt.tool_name, args_short, output_snippet));
    }

    Some(format!("You previously used these tools:\n{}", lines.join("\n")))
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(id: &str, role: &str, visibility: Visibility, content: &str, t: i64) -> MessageRow {
        MessageRow {
            id: id.into(),
            turn_id: None,
            role: role.into(),
            visibility,
            agent_key: None,
            source_agent_key: None,
            agent_name: None,
            content: content.into(),
            created_at: Utc.timestamp_opt(t, 0).unwrap(),
        }
    }

    #[test]
    fn solo_session_keeps_only_shared() {
        let rows = vec![
            row("1", "user", Visibility::Shared, "hi", 1),
            row("2", "assistant", Visibility::Private, "scratch", 2),
        ];
        let history = build_history_messages(&rows, false, None, 3);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hi");
    }

    #[test]
    fn assistant_name_tag_stripped_and_reapplied_for_other_agent() {
        let mut r = row("1", "assistant", Visibility::Shared, "[OldTag]: hello", 1);
        r.source_agent_key = Some("writer".into());
        r.agent_name = Some("Writer".into());
        let rows = vec![r];
        let history = build_history_messages(&rows, true, Some("editor"), 3);
        assert_eq!(history[0].content, "[Writer]: hello");
    }

    #[test]
    fn tool_memory_block_none_when_empty() {
        assert!(build_tool_memory_block(&[], 10).is_none());
    }

    #[test]
    fn tool_memory_block_truncates_long_output() {
        let evt = ToolCallRow {
            tool_name: "search".into(),
            tool_input_json: r#"{"query":"rust"}"#.into(),
            tool_output_json: "x".repeat(250),
            created_at: Utc.timestamp_opt(1, 0).unwrap(),
        };
        let block = build_tool_memory_block(&[evt], 10).unwrap();
        assert!(block.contains("search(query="));
        assert!(block.ends_with("..."));
    }
}
