//! Orchestrator-mode routing: picks which agents handle the current
//! round, decides whether another round is worth running, and
//! synthesizes a final answer from whatever specialists produced.
//!
//! All three calls go straight to an [`LlmProvider`] the same way
//! `ca-context`'s summary pipeline does — there is no separate gateway
//! abstraction in front of it.

use ca_domain::json_fence::strip_json_fences;
use ca_domain::model::ActiveAgent;
use ca_domain::stream::Usage;
use ca_domain::tool::Message;
use ca_domain::trace::TraceEvent;
use ca_providers::{ChatRequest, LlmProvider};
use serde::Deserialize;

const MAX_ROUND_SELECTION: usize = 3;

/// The outcome of routing one round: which agents to invoke, in order.
/// An empty selection on a round after the first means the manager has
/// decided no specialist needs to run again — the caller should treat
/// that as "stop", not as a fallback case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub selected_agent_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RoutingResponse {
    #[serde(default)]
    assignments: Vec<Assignment>,
    #[serde(default)]
    selected_agent_keys: Vec<String>,
    #[serde(default)]
    selected_agent_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Assignment {
    agent_key: String,
}

#[derive(Debug, Deserialize)]
struct RoundEvaluationResponse {
    #[serde(rename = "continue")]
    should_continue: bool,
}

fn build_manager_system_prompt(agents: &[ActiveAgent], prior_round_outputs: Option<&[(String, String)]>) -> String {
    let mut roster = String::new();
    for agent in agents {
        let key = agent.agent_key.as_deref().unwrap_or(&agent.name);
        roster.push_str(&format!(
            "- {key}: role=\"{}\" tools={:?}\n",
            agent.role_prompt, agent.tool_permissions
        ));
    }

    let mut prompt = format!(
        "You are the routing manager for a multi-agent room. Available specialists:\n{roster}\n\
         Select which specialists should respond this round.\n\
         Rules:\n\
         - Select at most {MAX_ROUND_SELECTION} agents.\n\
         - If the user explicitly asks for multiple perspectives, select all of them.\n\
         - Do not re-select an agent that already answered unless its input is still needed.\n\
         - Prefer selecting agents who can run concurrently over serial follow-ups.\n\
         Respond with JSON only, no prose: {{\"assignments\": [{{\"agent_key\": \"...\", \"instruction\": \"...\"}}]}}"
    );

    if let Some(prior) = prior_round_outputs {
        if !prior.is_empty() {
            prompt.push_str("\n\nPrior round outputs:\n");
            for (name, text) in prior {
                prompt.push_str(&format!("[{name}]: {text}\n"));
            }
        }
    }

    prompt
}

/// Route one round of an orchestrator turn.
///
/// Returns an empty selection (not an error) when `prior_round_outputs`
/// is present and the manager selects nothing — that is a valid "stop
/// here" signal for rounds after the first. On the first round, an
/// empty or unparseable response instead falls back to the first agent,
/// since a turn with no specialist invoked at all would never produce
/// an answer.
///
/// Also returns the manager model's token usage for this round's
/// routing call, when one was actually made — the deterministic "all"
/// shortcut and the fallback-on-error path make no model call and
/// report `None`. The manager's routing calls burn credits the same as
/// any specialist call, so callers attribute this usage to its own
/// `LlmCallEvent` with `agent_id=null`.
pub async fn route_turn(
    agents: &[ActiveAgent],
    user_input: &str,
    provider: &dyn LlmProvider,
    model: &str,
    prior_round_outputs: Option<&[(String, String)]>,
) -> ca_domain::Result<(RoutingDecision, Option<Usage>)> {
    let (decision, fallback_used, usage) =
        route_turn_inner(agents, user_input, provider, model, prior_round_outputs).await?;
    TraceEvent::RoutingDecided { selected_agent_keys: decision.selected_agent_keys.clone(), fallback_used }.emit();
    Ok((decision, usage))
}

async fn route_turn_inner(
    agents: &[ActiveAgent],
    user_input: &str,
    provider: &dyn LlmProvider,
    model: &str,
    prior_round_outputs: Option<&[(String, String)]>,
) -> ca_domain::Result<(RoutingDecision, bool, Option<Usage>)> {
    let Some(first) = agents.first() else {
        return Err(ca_domain::Error::Other("route_turn called with no agents".into()));
    };
    let fallback = RoutingDecision { selected_agent_keys: vec![agent_key(first)] };

    // LLMs reliably struggle to emit a JSON array with every requested
    // element when asked for "all" of something; when the user's intent
    // is unambiguous, skip the model call and select everyone directly.
    if prior_round_outputs.is_none() && agents.len() > 1 && user_input.to_lowercase().contains("all ") {
        return Ok((RoutingDecision { selected_agent_keys: agents.iter().map(agent_key).collect() }, false, None));
    }

    let system_prompt = build_manager_system_prompt(agents, prior_round_outputs);
    let request = ChatRequest {
        messages: vec![Message::system(system_prompt), Message::user(user_input)],
        tools: vec![],
        temperature: None,
        max_tokens: Some(256),
        json_mode: true,
        model: Some(model.to_string()),
    };

    let response = match provider.chat(request).await {
        Ok(r) => r,
        Err(_) => return Ok((fallback, true, None)),
    };
    let usage = response.usage.clone();

    let Ok(parsed) = serde_json::from_str::<RoutingResponse>(&strip_json_fences(&response.content)) else {
        return Ok((fallback, true, usage));
    };

    // Prefer the documented `assignments` shape; fall back to the legacy
    // `selected_agent_keys`/`selected_agent_key` shapes a manager reply
    // may still use.
    let mut selected = Vec::new();
    let raw_keys: Vec<String> = if !parsed.assignments.is_empty() {
        parsed.assignments.into_iter().map(|a| a.agent_key).collect()
    } else if !parsed.selected_agent_keys.is_empty() {
        parsed.selected_agent_keys
    } else if let Some(key) = parsed.selected_agent_key {
        vec![key]
    } else {
        Vec::new()
    };

    for raw_key in raw_keys {
        let key = raw_key.trim().to_lowercase();
        if key.is_empty() || selected.contains(&key) {
            continue;
        }
        if agents.iter().any(|a| agent_key(a) == key) {
            selected.push(key);
        }
        if selected.len() == MAX_ROUND_SELECTION {
            break;
        }
    }

    if selected.is_empty() {
        if prior_round_outputs.is_some() {
            // A later round legitimately selecting nobody means stop.
            return Ok((RoutingDecision { selected_agent_keys: vec![] }, false, usage));
        }
        return Ok((fallback, true, usage));
    }

    Ok((RoutingDecision { selected_agent_keys: selected }, false, usage))
}

/// Ask the manager whether another orchestrator round is worth running.
/// Never raises: a parse failure is treated the same as an explicit
/// "stop" answer, since continuing on an unparseable signal risks an
/// unbounded loop far more than stopping early risks an incomplete one.
///
/// Also returns the manager's token usage for this evaluation call, when
/// the call actually went through (a provider failure makes no usage
/// available).
pub async fn evaluate_orchestrator_round(
    provider: &dyn LlmProvider,
    model: &str,
    user_input: &str,
    all_round_outputs: &[(String, String)],
    current_round: u32,
) -> (bool, Option<Usage>) {
    let mut transcript = String::new();
    for (name, text) in all_round_outputs {
        transcript.push_str(&format!("[{name}]: {text}\n"));
    }

    let system_prompt = format!(
        "You are the routing manager. Round {current_round} just finished.\n\
         Original request: {user_input}\n\
         Outputs so far:\n{transcript}\n\
         Decide if another round is needed to fully answer the request.\n\
         Respond with JSON only: {{\"continue\": true}} or {{\"continue\": false}}."
    );

    let request = ChatRequest {
        messages: vec![Message::system(system_prompt)],
        tools: vec![],
        temperature: None,
        max_tokens: Some(128),
        json_mode: true,
        model: Some(model.to_string()),
    };

    let Ok(response) = provider.chat(request).await else {
        return (false, None);
    };

    let should_continue = serde_json::from_str::<RoundEvaluationResponse>(&strip_json_fences(&response.content))
        .map(|r| r.should_continue)
        .unwrap_or(false);

    (should_continue, response.usage)
}

/// Build the message list used to synthesize a final answer from
/// specialist outputs, without introducing any information the
/// specialists did not already provide.
pub fn build_orchestrator_synthesis_messages(user_input: &str, specialist_outputs: &[(String, String)]) -> Vec<Message> {
    let mut block = String::new();
    for (name, text) in specialist_outputs {
        block.push_str(&format!("[{name}]: {text}\n"));
    }

    vec![
        Message::system(
            "Synthesize the specialists' outputs below into a single coherent answer for the user. \
             Do not introduce facts the specialists did not provide.",
        ),
        Message::user(user_input),
        Message::system(format!("Specialist outputs:\n{block}")),
        Message::system("Write the final answer now."),
    ]
}

/// Generate the final synthesis, or `None` when no specialist produced
/// anything to synthesize from. Also returns the manager's token usage
/// for the synthesis call.
pub async fn generate_orchestrator_synthesis(
    provider: &dyn LlmProvider,
    model: &str,
    user_input: &str,
    specialist_outputs: &[(String, String)],
    max_output_tokens: Option<u32>,
) -> ca_domain::Result<(Option<String>, Option<Usage>)> {
    if specialist_outputs.is_empty() {
        return Ok((None, None));
    }

    let request = ChatRequest {
        messages: build_orchestrator_synthesis_messages(user_input, specialist_outputs),
        tools: vec![],
        temperature: None,
        max_tokens: max_output_tokens,
        json_mode: false,
        model: Some(model.to_string()),
    };

    let response = provider.chat(request).await?;
    Ok((Some(response.content), response.usage))
}

fn agent_key(agent: &ActiveAgent) -> String {
    agent.agent_key.clone().unwrap_or_else(|| agent.name.to_lowercase()).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ca_domain::capability::{LlmCapabilities, ToolSupport};
    use ca_domain::stream::{BoxStream, StreamEvent};
    use ca_domain::Result;
    use parking_lot::Mutex;

    fn agent(key: &str) -> ActiveAgent {
        ActiveAgent {
            agent_id: Some(key.into()),
            agent_key: Some(key.into()),
            name: key.into(),
            model_alias: "default".into(),
            role_prompt: "role".into(),
            tool_permissions: vec![],
        }
    }

    struct ScriptedProvider {
        reply: Mutex<Option<String>>,
        capabilities: LlmCapabilities,
    }

    impl ScriptedProvider {
        fn new(reply: impl Into<String>) -> Self {
            Self {
                reply: Mutex::new(Some(reply.into())),
                capabilities: LlmCapabilities {
                    supports_tools: ToolSupport::None,
                    supports_streaming: false,
                    supports_json_mode: true,
                    supports_vision: false,
                    context_window_tokens: Some(8192),
                    max_output_tokens: Some(256),
                },
            }
        }

        fn failing() -> Self {
            Self {
                reply: Mutex::new(None),
                capabilities: LlmCapabilities {
                    supports_tools: ToolSupport::None,
                    supports_streaming: false,
                    supports_json_mode: true,
                    supports_vision: false,
                    context_window_tokens: None,
                    max_output_tokens: None,
                },
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ca_providers::ChatResponse> {
            match self.reply.lock().clone() {
                Some(content) => Ok(ca_providers::ChatResponse { content, tool_calls: vec![], usage: None, model: "m".into(), finish_reason: Some("stop".into()) }),
                None => Err(ca_domain::Error::Http("down".into())),
            }
        }
        async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            unimplemented!()
        }
        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }
        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn all_keyword_selects_everyone_without_a_model_call() {
        let agents = vec![agent("alpha"), agent("beta")];
        let provider = ScriptedProvider::failing();
        let (decision, usage) = route_turn(&agents, "ask all agents about this", &provider, "m", None).await.unwrap();
        assert_eq!(decision.selected_agent_keys, vec!["alpha".to_string(), "beta".to_string()]);
        assert!(usage.is_none());
    }

    #[tokio::test]
    async fn valid_response_selects_named_agents() {
        let agents = vec![agent("alpha"), agent("beta")];
        let provider = ScriptedProvider::new("```json\n{\"assignments\": [{\"agent_key\": \"beta\", \"instruction\": \"go\"}]}\n```");
        let (decision, _usage) = route_turn(&agents, "ask beta", &provider, "m", None).await.unwrap();
        assert_eq!(decision.selected_agent_keys, vec!["beta".to_string()]);
    }

    #[tokio::test]
    async fn legacy_selected_agent_keys_shape_is_understood() {
        let agents = vec![agent("alpha"), agent("beta")];
        let provider = ScriptedProvider::new("{\"selected_agent_keys\": [\"beta\"]}");
        let (decision, _usage) = route_turn(&agents, "ask beta", &provider, "m", None).await.unwrap();
        assert_eq!(decision.selected_agent_keys, vec!["beta".to_string()]);
    }

    #[tokio::test]
    async fn legacy_selected_agent_key_singular_shape_is_understood() {
        let agents = vec![agent("alpha"), agent("beta")];
        let provider = ScriptedProvider::new("{\"selected_agent_key\": \"alpha\"}");
        let (decision, _usage) = route_turn(&agents, "ask alpha", &provider, "m", None).await.unwrap();
        assert_eq!(decision.selected_agent_keys, vec!["alpha".to_string()]);
    }

    #[tokio::test]
    async fn unparseable_response_falls_back_to_first_agent_on_first_round() {
        let agents = vec![agent("alpha"), agent("beta")];
        let provider = ScriptedProvider::new("not json at all");
        let (decision, _usage) = route_turn(&agents, "ask something", &provider, "m", None).await.unwrap();
        assert_eq!(decision.selected_agent_keys, vec!["alpha".to_string()]);
    }

    #[tokio::test]
    async fn empty_selection_on_later_round_means_stop() {
        let agents = vec![agent("alpha"), agent("beta")];
        let provider = ScriptedProvider::new("{\"assignments\": []}");
        let prior = vec![("alpha".to_string(), "answer".to_string())];
        let (decision, _usage) = route_turn(&agents, "follow up", &provider, "m", Some(&prior)).await.unwrap();
        assert!(decision.selected_agent_keys.is_empty());
    }

    #[tokio::test]
    async fn selection_is_capped_at_three() {
        let agents: Vec<ActiveAgent> = ["a", "b", "c", "d"].iter().map(|k| agent(k)).collect();
        let provider = ScriptedProvider::new(
            "{\"assignments\": [{\"agent_key\":\"a\"},{\"agent_key\":\"b\"},{\"agent_key\":\"c\"},{\"agent_key\":\"d\"}]}",
        );
        let (decision, _usage) = route_turn(&agents, "ask everyone", &provider, "m", None).await.unwrap();
        assert_eq!(decision.selected_agent_keys.len(), 3);
    }

    #[tokio::test]
    async fn provider_failure_during_evaluation_stops_the_loop() {
        let provider = ScriptedProvider::failing();
        let (should_continue, usage) = evaluate_orchestrator_round(&provider, "m", "question", &[], 1).await;
        assert!(!should_continue);
        assert!(usage.is_none());
    }

    #[tokio::test]
    async fn no_specialist_outputs_yields_no_synthesis() {
        let provider = ScriptedProvider::new("anything");
        let (synthesis, usage) = generate_orchestrator_synthesis(&provider, "m", "question", &[], None).await.unwrap();
        assert!(synthesis.is_none());
        assert!(usage.is_none());
    }
}
