//! Provider-agnostic chat message and tool-call types shared by
//! `ca-providers`, `ca-context`, and `ca-runtime`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut parts = Vec::new();
        let text = text.into();
        if !text.is_empty() {
            parts.push(ContentPart::Text { text });
        }
        for call in tool_calls {
            parts.push(ContentPart::ToolUse {
                id: call.call_id,
                name: call.tool_name,
                input: call.arguments,
            });
        }
        Self {
            role: Role::Assistant,
            content: MessageContent::Parts(parts),
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::tool_result_with_status(tool_use_id, content, false)
    }

    pub fn tool_result_with_status(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error,
            }]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text(text.into())
    }

    /// Concatenate every text-bearing part, ignoring tool-use/tool-result
    /// parts. Used when sending to providers that want a single string.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
    Image {
        media_type: String,
        data: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_all_text_from_plain_text() {
        let msg = Message::user("hello");
        assert_eq!(msg.content.extract_all_text(), "hello");
    }

    #[test]
    fn extract_all_text_skips_tool_parts() {
        let msg = Message::assistant_with_tool_calls(
            "thinking",
            vec![ToolCall {
                call_id: "c1".into(),
                tool_name: "search".into(),
                arguments: serde_json::json!({"q": "x"}),
            }],
        );
        assert_eq!(msg.content.extract_all_text(), "thinking");
    }

    #[test]
    fn tool_result_wraps_single_part() {
        let msg = Message::tool_result("call_1", "result text");
        if let MessageContent::Parts(parts) = &msg.content {
            assert_eq!(parts.len(), 1);
            if let ContentPart::ToolResult { content, is_error, .. } = &parts[0] {
                assert_eq!(content, "result text");
                assert!(!is_error);
            } else {
                panic!("expected ToolResult part");
            }
        } else {
            panic!("expected Parts content");
        }
    }
}
