//! Invokes a single agent against a fixed prompt, running its tool-call
//! loop to completion. One call here is one "agent turn" in manual,
//! roundtable, or orchestrator mode — the unit every mode dispatch
//! composes.

use ca_domain::model::ActiveAgent;
use ca_domain::stream::Usage;
use ca_domain::tool::Message;
use ca_providers::{ChatRequest, ChatResponse, LlmProvider};
use ca_tools::backends::{FileReadBackend, SearchBackend};
use ca_tools::{build_tool_definitions, dispatch_tool};
use futures_util::future::join_all;

/// Hard ceiling on tool-call round-trips within one agent invocation. An
/// agent that is still calling tools after this many iterations is
/// considered stuck rather than making progress.
const LOOP_LIMIT: u32 = 4;

/// One resolved tool call and its outcome, kept for persistence and
/// usage accounting.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub output: String,
    pub is_error: bool,
}

/// The outcome of invoking one agent once against a base prompt.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub text: String,
    pub success: bool,
    pub usage: Vec<Usage>,
    pub tool_calls: Vec<ToolInvocation>,
}

impl InvocationOutcome {
    fn failed(text: impl Into<String>) -> Self {
        Self { text: text.into(), success: false, usage: Vec::new(), tool_calls: Vec::new() }
    }
}

/// Run `agent` against `base_messages`, looping through any tool calls
/// the model makes until it returns a final answer or [`LOOP_LIMIT`] is
/// reached.
///
/// Mirrors the original per-agent invocation loop: build a local tool
/// set filtered by the agent's permissions, call the provider, and if
/// the response carries tool calls, dispatch each one and feed the
/// results back as `tool`-role messages before calling again. A tool
/// call that errors never aborts the loop — its error text is handed
/// back to the model as the tool result, the same as a successful one.
pub async fn invoke_agent(
    agent: &ActiveAgent,
    provider: &dyn LlmProvider,
    model: &str,
    base_messages: Vec<Message>,
    max_output_tokens: Option<u32>,
    search: &dyn SearchBackend,
    file_read: &dyn FileReadBackend,
    room_id: Option<&str>,
    session_id: Option<&str>,
) -> InvocationOutcome {
    let tools = build_tool_definitions(agent);
    let mut messages = base_messages;
    let mut usage = Vec::new();
    let mut tool_calls = Vec::new();

    for _ in 0..LOOP_LIMIT {
        let request = ChatRequest {
            messages: messages.clone(),
            tools: tools.clone(),
            temperature: None,
            max_tokens: max_output_tokens,
            json_mode: false,
            model: Some(model.to_string()),
        };

        let response = match provider.chat(request).await {
            Ok(response) => response,
            Err(e) => {
                return InvocationOutcome {
                    text: format!("[[agent_error]] type=provider_error message={e}"),
                    success: false,
                    usage,
                    tool_calls,
                }
            }
        };

        if let Some(u) = response_usage(&response) {
            usage.push(u);
        }

        if response.tool_calls.is_empty() {
            return InvocationOutcome { text: response.content, success: true, usage, tool_calls };
        }

        messages.push(Message::assistant_with_tool_calls(response.content.clone(), response.tool_calls.clone()));

        // Tool calls within one round are independent of each other, so
        // dispatch them concurrently and feed results back in the order
        // the model asked for them, not the order they finish in.
        let dispatched = join_all(response.tool_calls.iter().map(|call| {
            dispatch_tool(&call.tool_name, &call.arguments, search, file_read, room_id, session_id)
        }))
        .await;

        for (call, (output, is_error)) in response.tool_calls.iter().zip(dispatched) {
            tool_calls.push(ToolInvocation {
                tool_name: call.tool_name.clone(),
                arguments: call.arguments.clone(),
                output: output.clone(),
                is_error,
            });

            messages.push(Message::tool_result_with_status(call.call_id.clone(), output, is_error));
        }
    }

    let mut outcome = InvocationOutcome::failed("Agent iteration limit exceeded due to too many tool calls.");
    outcome.usage = usage;
    outcome.tool_calls = tool_calls;
    outcome
}

fn response_usage(response: &ChatResponse) -> Option<Usage> {
    response.usage.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ca_domain::capability::{LlmCapabilities, ToolSupport};
    use ca_domain::stream::{BoxStream, StreamEvent};
    use ca_domain::tool::ToolCall;
    use ca_domain::Result;
    use ca_tools::backends::{FileReadResult, FileReadStatus};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn agent(tools: &[&str]) -> ActiveAgent {
        ActiveAgent {
            agent_id: Some("a1".into()),
            agent_key: Some("researcher".into()),
            name: "Researcher".into(),
            model_alias: "default".into(),
            role_prompt: "You research things.".into(),
            tool_permissions: tools.iter().map(|s| s.to_string()).collect(),
        }
    }

    struct StubSearch;
    #[async_trait]
    impl SearchBackend for StubSearch {
        async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<ca_tools::backends::SearchResult>> {
            Ok(vec![])
        }
    }

    struct StubFileRead;
    #[async_trait]
    impl FileReadBackend for StubFileRead {
        async fn read(&self, _file_id: &str, _room_id: Option<&str>, _session_id: Option<&str>) -> Result<FileReadResult> {
            Ok(FileReadResult { status: FileReadStatus::Completed, content: Some("file text".into()), error: None })
        }
    }

    /// Replays a fixed sequence of responses, one per call, regardless of
    /// what was asked — enough to drive the loop through a tool round
    /// then a final answer.
    struct ScriptedProvider {
        responses: Mutex<Vec<ChatResponse>>,
        capabilities: LlmCapabilities,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
                capabilities: LlmCapabilities {
                    supports_tools: ToolSupport::Loose,
                    supports_streaming: false,
                    supports_json_mode: false,
                    supports_vision: false,
                    context_window_tokens: Some(8192),
                    max_output_tokens: Some(1024),
                },
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            Ok(self.responses.lock().pop().expect("scripted response available"))
        }

        async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            unimplemented!("not exercised by invoker tests")
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }

        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    fn text_response(text: &str) -> ChatResponse {
        ChatResponse { content: text.into(), tool_calls: vec![], usage: None, model: "m".into(), finish_reason: Some("stop".into()) }
    }

    #[tokio::test]
    async fn final_answer_with_no_tool_calls_succeeds_immediately() {
        let provider = ScriptedProvider::new(vec![text_response("Here is the answer.")]);
        let outcome = invoke_agent(
            &agent(&[]),
            &provider,
            "m",
            vec![Message::user("hi")],
            None,
            &StubSearch,
            &StubFileRead,
            None,
            Some("s1"),
        )
        .await;
        assert!(outcome.success);
        assert_eq!(outcome.text, "Here is the answer.");
        assert!(outcome.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn tool_call_is_dispatched_and_fed_back() {
        let tool_call = ToolCall { call_id: "c1".into(), tool_name: "file_read".into(), arguments: serde_json::json!({"file_id": "f1"}) };
        let provider = ScriptedProvider::new(vec![
            ChatResponse { content: String::new(), tool_calls: vec![tool_call], usage: None, model: "m".into(), finish_reason: Some("tool_calls".into()) },
            text_response("Done, based on the file."),
        ]);
        let outcome = invoke_agent(
            &agent(&["file_read"]),
            &provider,
            "m",
            vec![Message::user("read it")],
            None,
            &StubSearch,
            &StubFileRead,
            None,
            Some("s1"),
        )
        .await;
        assert!(outcome.success);
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(!outcome.tool_calls[0].is_error);
        assert_eq!(outcome.tool_calls[0].output, "file text");
    }

    #[tokio::test]
    async fn exceeding_loop_limit_reports_failure() {
        let tool_call = ToolCall { call_id: "c1".into(), tool_name: "search".into(), arguments: serde_json::json!({"query": "x"}) };
        let mut responses = Vec::new();
        for _ in 0..(LOOP_LIMIT + 1) {
            responses.push(ChatResponse {
                content: String::new(),
                tool_calls: vec![tool_call.clone()],
                usage: None,
                model: "m".into(),
                finish_reason: Some("tool_calls".into()),
            });
        }
        let provider = ScriptedProvider::new(responses);
        let outcome = invoke_agent(
            &agent(&["search"]),
            &provider,
            "m",
            vec![Message::user("keep searching")],
            None,
            &StubSearch,
            &StubFileRead,
            None,
            Some("s1"),
        )
        .await;
        assert!(!outcome.success);
        assert_eq!(outcome.text, "Agent iteration limit exceeded due to too many tool calls.");
    }

    #[tokio::test]
    async fn provider_error_is_wrapped_not_propagated() {
        struct FailingProvider(LlmCapabilities);
        #[async_trait]
        impl LlmProvider for FailingProvider {
            async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
                Err(ca_domain::Error::Http("boom".into()))
            }
            async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
                unimplemented!()
            }
            fn capabilities(&self) -> &LlmCapabilities {
                &self.0
            }
            fn provider_id(&self) -> &str {
                "failing"
            }
        }

        let provider = FailingProvider(LlmCapabilities {
            supports_tools: ToolSupport::None,
            supports_streaming: false,
            supports_json_mode: false,
            supports_vision: false,
            context_window_tokens: None,
            max_output_tokens: None,
        });
        let outcome = invoke_agent(&agent(&[]), &provider, "m", vec![Message::user("hi")], None, &StubSearch, &StubFileRead, None, Some("s1")).await;
        assert!(!outcome.success);
        assert!(outcome.text.starts_with("[[agent_error]]"));
    }

    #[allow(dead_code)]
    fn assert_send_sync<T: Send + Sync>() {}
    #[allow(dead_code)]
    fn _arc_provider_is_object_safe(p: Arc<dyn LlmProvider>) {
        let _ = p;
    }
}
