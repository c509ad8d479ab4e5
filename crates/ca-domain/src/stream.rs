use std::pin::Pin;

use futures_core::Stream;
use serde::{Deserialize, Serialize};

pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// Portion of `prompt_tokens` served from a provider-side cache.
    /// Providers that don't distinguish cached tokens report 0 here.
    #[serde(default)]
    pub prompt_tokens_cached: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token { text: String },
    Thinking { text: String },
    ToolCallStarted { call_id: String, tool_name: String },
    ToolCallDelta { call_id: String, delta: String },
    ToolCallFinished { call_id: String },
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },
    Error { message: String },
}
