//! Mode dispatch: given a room's active agents and the assembled
//! prompt for a turn, decides who gets invoked and how their outputs
//! combine into the turn's final answer.
//!
//! Standalone rooms reduce to a single fixed invocation
//! ([`execute_single`]); manual/tag rooms resolve `@<agent_key>` tokens
//! out of the user's input first ([`execute_tagged`]). Roundtable and
//! orchestrator get their own functions.

use ca_domain::model::ActiveAgent;
use ca_domain::model::TurnStatus;
use ca_domain::stream::Usage;
use ca_domain::tool::Message;
use ca_domain::trace::TraceEvent;
use ca_domain::{Error, ValidationErrorKind};
use ca_providers::ProviderRegistry;

use crate::invoker::{invoke_agent, InvocationOutcome, ToolInvocation};
use crate::routing_manager::{evaluate_orchestrator_round, generate_orchestrator_synthesis, route_turn};
use ca_tools::backends::{FileReadBackend, SearchBackend};

const ERROR_MARKER: &str = "[[agent_error]]";

/// One agent's contribution within a round, kept for transcript
/// persistence regardless of which mode produced it.
#[derive(Debug, Clone)]
pub struct RoundEntry {
    pub round: u32,
    pub agent_key: String,
    pub agent_name: String,
    pub text: String,
    pub success: bool,
}

/// One model call's token usage, attributed to the agent that made it —
/// or to no agent at all when the call came from the routing manager
/// (`agent_key: None`), which still burns credits of its own.
#[derive(Debug, Clone)]
pub struct AgentUsage {
    pub agent_key: Option<String>,
    pub model_alias: String,
    pub usage: Usage,
}

/// The full result of dispatching one turn across its active agents.
#[derive(Debug, Clone)]
pub struct ModeOutcome {
    pub per_round_entries: Vec<RoundEntry>,
    pub final_text: String,
    pub status: TurnStatus,
    pub usage_events: Vec<AgentUsage>,
    pub tool_calls: Vec<ToolInvocation>,
}

impl ModeOutcome {
    fn absorb(&mut self, agent: &ActiveAgent, outcome: &InvocationOutcome) {
        for usage in &outcome.usage {
            self.usage_events.push(AgentUsage {
                agent_key: Some(agent_key_of(agent)),
                model_alias: agent.model_alias.clone(),
                usage: *usage,
            });
        }
        self.tool_calls.extend(outcome.tool_calls.iter().cloned());
    }
}

fn agent_key_of(agent: &ActiveAgent) -> String {
    agent.agent_key.clone().unwrap_or_else(|| agent.name.to_lowercase())
}

/// Resolve the `@<agent_key>` tokens in `user_input` against
/// `active_agents`, matching case-insensitively and keeping only the
/// first occurrence of each matched agent, in the order the tags
/// appeared.
fn extract_tagged_agents<'a>(user_input: &str, active_agents: &'a [ActiveAgent]) -> Vec<&'a ActiveAgent> {
    let mut matched = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for token in user_input.split_whitespace() {
        let token = token.trim_matches(|c: char| !(c.is_alphanumeric() || c == '@' || c == '_' || c == '-'));
        let Some(tag) = token.strip_prefix('@') else { continue };
        let key = tag.to_lowercase();
        if key.is_empty() || seen.contains(&key) {
            continue;
        }
        if let Some(agent) = active_agents.iter().find(|a| agent_key_of(a) == key) {
            matched.push(agent);
            seen.insert(key);
        }
    }

    matched
}

async fn invoke(
    agent: &ActiveAgent,
    base_messages: Vec<Message>,
    registry: &ProviderRegistry,
    max_output_tokens: Option<u32>,
    search: &dyn SearchBackend,
    file_read: &dyn FileReadBackend,
    room_id: Option<&str>,
    session_id: Option<&str>,
) -> InvocationOutcome {
    let resolved = match registry.resolve(&agent.model_alias) {
        Ok(r) => r,
        Err(e) => {
            TraceEvent::AgentInvoked {
                agent_key: Some(agent_key_of(agent)),
                model_alias: agent.model_alias.clone(),
                success: false,
            }
            .emit();
            return InvocationOutcome {
                text: format!("{ERROR_MARKER} type=unresolved_model message={e}"),
                success: false,
                usage: vec![],
                tool_calls: vec![],
            }
        }
    };

    let outcome = invoke_agent(
        agent,
        resolved.provider.as_ref(),
        &resolved.model,
        base_messages,
        max_output_tokens,
        search,
        file_read,
        room_id,
        session_id,
    )
    .await;

    TraceEvent::AgentInvoked {
        agent_key: Some(agent_key_of(agent)),
        model_alias: agent.model_alias.clone(),
        success: outcome.success,
    }
    .emit();

    outcome
}

fn empty_outcome() -> ModeOutcome {
    ModeOutcome { per_round_entries: vec![], final_text: String::new(), status: TurnStatus::Completed, usage_events: vec![], tool_calls: vec![] }
}

/// Standalone mode: invoke the session's one bound agent once against
/// the assembled prompt. No `@`-tag resolution applies here — the agent
/// is already fixed by the session, not chosen by the user's input.
#[allow(clippy::too_many_arguments)]
pub async fn execute_single(
    active_agents: &[ActiveAgent],
    primary_context_messages: &[Message],
    registry: &ProviderRegistry,
    max_output_tokens: Option<u32>,
    search: &dyn SearchBackend,
    file_read: &dyn FileReadBackend,
    room_id: Option<&str>,
    session_id: Option<&str>,
) -> ModeOutcome {
    let mut result = empty_outcome();

    let Some(agent) = active_agents.first() else {
        result.status = TurnStatus::Failed;
        result.final_text = "No active agent available to handle this turn.".into();
        return result;
    };

    let mut base_messages = vec![Message::system(format!("Agent role: {}", agent.role_prompt))];
    base_messages.extend(primary_context_messages.iter().cloned());

    let outcome = invoke(agent, base_messages, registry, max_output_tokens, search, file_read, room_id, session_id).await;
    result.absorb(agent, &outcome);
    result.per_round_entries.push(RoundEntry {
        round: 1,
        agent_key: agent_key_of(agent),
        agent_name: agent.name.clone(),
        text: outcome.text.clone(),
        success: outcome.success,
    });
    result.final_text = outcome.text;
    if !outcome.success {
        result.status = TurnStatus::Partial;
    }
    result
}

/// Manual/tag mode: resolve the `@<agent_key>` tokens in `user_input`
/// against the room's active agents and invoke each matched agent in
/// order against the same base context — no agent sees another's
/// output, unlike roundtable. Fails validation before any model call
/// when the room has no agents at all, or when none of the user's tags
/// matched one.
#[allow(clippy::too_many_arguments)]
pub async fn execute_tagged(
    active_agents: &[ActiveAgent],
    user_input: &str,
    primary_context_messages: &[Message],
    registry: &ProviderRegistry,
    max_output_tokens: Option<u32>,
    search: &dyn SearchBackend,
    file_read: &dyn FileReadBackend,
    room_id: Option<&str>,
    session_id: Option<&str>,
) -> ca_domain::Result<ModeOutcome> {
    if active_agents.is_empty() {
        return Err(Error::Validation { kind: ValidationErrorKind::NoRoomAgents });
    }

    let tagged = extract_tagged_agents(user_input, active_agents);
    if tagged.is_empty() {
        return Err(Error::Validation { kind: ValidationErrorKind::NoValidTaggedAgents });
    }

    let mut result = empty_outcome();
    let mut any_failed = false;

    for agent in tagged {
        let mut base_messages = vec![Message::system(format!("Agent role: {}", agent.role_prompt))];
        base_messages.extend(primary_context_messages.iter().cloned());

        let outcome = invoke(agent, base_messages, registry, max_output_tokens, search, file_read, room_id, session_id).await;
        result.absorb(agent, &outcome);
        result.per_round_entries.push(RoundEntry {
            round: 1,
            agent_key: agent_key_of(agent),
            agent_name: agent.name.clone(),
            text: outcome.text.clone(),
            success: outcome.success,
        });
        if !outcome.success {
            any_failed = true;
        }
    }

    result.status = if any_failed { TurnStatus::Partial } else { TurnStatus::Completed };
    result.final_text = if result.per_round_entries.len() == 1 {
        result.per_round_entries[0].text.clone()
    } else {
        result.per_round_entries.iter().map(|e| format!("[{}]: {}", e.agent_name, e.text)).collect::<Vec<_>>().join("\n\n")
    };

    Ok(result)
}

/// Roundtable mode: every active agent responds in order within one
/// round, each seeing the prior agents' outputs from this same round
/// tagged with their name, appended after the shared prompt.
#[allow(clippy::too_many_arguments)]
pub async fn execute_roundtable(
    active_agents: &[ActiveAgent],
    primary_context_messages: &[Message],
    registry: &ProviderRegistry,
    max_output_tokens: Option<u32>,
    search: &dyn SearchBackend,
    file_read: &dyn FileReadBackend,
    room_id: Option<&str>,
    session_id: Option<&str>,
) -> ca_domain::Result<ModeOutcome> {
    if active_agents.is_empty() {
        return Err(Error::Validation { kind: ValidationErrorKind::NoRoomAgents });
    }

    let mut result = empty_outcome();
    let mut shared_history: Vec<Message> = vec![];
    let mut any_failed = false;

    for agent in active_agents {
        let mut base_messages = vec![Message::system(format!("Agent role: {}", agent.role_prompt))];
        base_messages.extend(primary_context_messages.iter().cloned());
        base_messages.extend(shared_history.iter().cloned());

        let outcome = invoke(agent, base_messages, registry, max_output_tokens, search, file_read, room_id, session_id).await;
        result.absorb(agent, &outcome);
        result.per_round_entries.push(RoundEntry {
            round: 1,
            agent_key: agent_key_of(agent),
            agent_name: agent.name.clone(),
            text: outcome.text.clone(),
            success: outcome.success,
        });

        if outcome.success {
            shared_history.push(Message::assistant(format!("[{}]: {}", agent.name, outcome.text)));
        } else {
            any_failed = true;
        }
    }

    result.status = if any_failed { TurnStatus::Partial } else { TurnStatus::Completed };
    result.final_text = result
        .per_round_entries
        .iter()
        .map(|e| format!("[{}]: {}", e.agent_name, e.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok(result)
}

/// Orchestrator mode: a manager routes each round to a bounded set of
/// specialists, decides whether another round is warranted, then
/// synthesizes a final answer from whatever specialists produced. Every
/// manager call — routing, round evaluation, synthesis — burns credits
/// in its own right and is recorded as a separate usage event with no
/// agent attached.
#[allow(clippy::too_many_arguments)]
pub async fn execute_orchestrator(
    active_agents: &[ActiveAgent],
    user_input: &str,
    primary_context_messages: &[Message],
    registry: &ProviderRegistry,
    manager_model_alias: &str,
    max_output_tokens: Option<u32>,
    max_rounds: u32,
    max_invocations: u32,
    search: &dyn SearchBackend,
    file_read: &dyn FileReadBackend,
    room_id: Option<&str>,
    session_id: Option<&str>,
) -> ca_domain::Result<ModeOutcome> {
    if active_agents.is_empty() {
        return Err(Error::Validation { kind: ValidationErrorKind::NoRoomAgents });
    }

    let mut result = empty_outcome();

    let manager = match registry.resolve(manager_model_alias) {
        Ok(r) => r,
        Err(e) => {
            result.status = TurnStatus::Failed;
            result.final_text = format!("{ERROR_MARKER} type=unresolved_manager_model message={e}");
            return Ok(result);
        }
    };

    let push_manager_usage = |result: &mut ModeOutcome, usage: Option<Usage>| {
        if let Some(usage) = usage {
            result.usage_events.push(AgentUsage { agent_key: None, model_alias: manager_model_alias.to_string(), usage });
        }
    };

    let mut specialist_outputs: Vec<(String, String)> = vec![];
    let mut current_round: u32 = 1;
    let mut total_invocations: u32 = 0;
    let mut any_failure = false;

    while current_round <= max_rounds && total_invocations < max_invocations {
        let prior = if current_round > 1 { Some(specialist_outputs.as_slice()) } else { None };

        let (decision, routing_usage) =
            match route_turn(active_agents, user_input, manager.provider.as_ref(), &manager.model, prior).await {
                Ok(d) => d,
                Err(_) => break,
            };
        push_manager_usage(&mut result, routing_usage);

        if decision.selected_agent_keys.is_empty() {
            break;
        }

        let remaining_cap = (max_invocations - total_invocations) as usize;
        let cap = remaining_cap.min(3);
        let assigned: Vec<&ActiveAgent> = decision
            .selected_agent_keys
            .iter()
            .filter_map(|key| active_agents.iter().find(|a| &agent_key_of(a) == key))
            .take(cap)
            .collect();

        if assigned.is_empty() {
            break;
        }

        let mut round_outputs: Vec<(String, String)> = vec![];

        for agent in assigned {
            let mut base_messages = vec![Message::system(format!("Agent role: {}", agent.role_prompt))];
            base_messages.extend(primary_context_messages.iter().cloned());

            let outcome = invoke(agent, base_messages, registry, max_output_tokens, search, file_read, room_id, session_id).await;
            result.absorb(agent, &outcome);
            total_invocations += 1;

            let key = agent_key_of(agent);
            result.per_round_entries.push(RoundEntry {
                round: current_round,
                agent_key: key.clone(),
                agent_name: agent.name.clone(),
                text: outcome.text.clone(),
                success: outcome.success,
            });
            if !outcome.success {
                any_failure = true;
            }
            round_outputs.push((key, outcome.text));
        }

        let all_errored = round_outputs.iter().all(|(_, text)| text.starts_with(ERROR_MARKER));
        specialist_outputs.extend(round_outputs);
        if all_errored {
            break;
        }

        let rounds_remain = current_round < max_rounds && total_invocations < max_invocations;
        if rounds_remain {
            let (should_continue, eval_usage) =
                evaluate_orchestrator_round(manager.provider.as_ref(), &manager.model, user_input, &specialist_outputs, current_round).await;
            push_manager_usage(&mut result, eval_usage);
            if !should_continue {
                break;
            }
        }

        current_round += 1;
    }

    result.status = if any_failure { TurnStatus::Partial } else { TurnStatus::Completed };

    if !specialist_outputs.is_empty() {
        match generate_orchestrator_synthesis(manager.provider.as_ref(), &manager.model, user_input, &specialist_outputs, max_output_tokens).await
        {
            Ok((Some(text), synthesis_usage)) => {
                result.final_text = text;
                push_manager_usage(&mut result, synthesis_usage);
            }
            Ok((None, synthesis_usage)) => push_manager_usage(&mut result, synthesis_usage),
            Err(e) => {
                result.status = TurnStatus::Partial;
                result.final_text = format!("[[manager_synthesis_error]] {e}");
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(key: &str) -> ActiveAgent {
        ActiveAgent {
            agent_id: Some(key.into()),
            agent_key: Some(key.into()),
            name: key.into(),
            model_alias: "missing".into(),
            role_prompt: "role".into(),
            tool_permissions: vec![],
        }
    }

    #[test]
    fn agent_key_of_falls_back_to_lowercased_name() {
        let mut a = agent("x");
        a.agent_key = None;
        a.name = "Researcher".into();
        assert_eq!(agent_key_of(&a), "researcher");
    }

    #[test]
    fn round_entry_tracks_round_number() {
        let entry = RoundEntry { round: 2, agent_key: "a".into(), agent_name: "A".into(), text: "t".into(), success: true };
        assert_eq!(entry.round, 2);
    }

    #[test]
    fn extract_tagged_agents_matches_case_insensitively() {
        let agents = vec![agent("alpha"), agent("beta")];
        let matched = extract_tagged_agents("hey @ALPHA can you help", &agents);
        assert_eq!(matched.len(), 1);
        assert_eq!(agent_key_of(matched[0]), "alpha");
    }

    #[test]
    fn extract_tagged_agents_preserves_first_occurrence_order_and_dedups() {
        let agents = vec![agent("alpha"), agent("beta")];
        let matched = extract_tagged_agents("@beta then @alpha then @beta again", &agents);
        let keys: Vec<String> = matched.iter().map(|a| agent_key_of(a)).collect();
        assert_eq!(keys, vec!["beta".to_string(), "alpha".to_string()]);
    }

    #[test]
    fn extract_tagged_agents_ignores_unknown_tags() {
        let agents = vec![agent("alpha")];
        let matched = extract_tagged_agents("@unknown do work", &agents);
        assert!(matched.is_empty());
    }

    #[test]
    fn extract_tagged_agents_strips_trailing_punctuation() {
        let agents = vec![agent("alpha")];
        let matched = extract_tagged_agents("@alpha, please help.", &agents);
        assert_eq!(matched.len(), 1);
    }

    struct NoopSearch;
    #[async_trait::async_trait]
    impl SearchBackend for NoopSearch {
        async fn search(&self, _query: &str, _max_results: usize) -> ca_domain::Result<Vec<ca_tools::backends::SearchResult>> {
            Ok(vec![])
        }
    }

    struct NoopFileRead;
    #[async_trait::async_trait]
    impl FileReadBackend for NoopFileRead {
        async fn read(&self, _file_id: &str, _room_id: Option<&str>, _session_id: Option<&str>) -> ca_domain::Result<ca_tools::backends::FileReadResult> {
            Ok(ca_tools::backends::FileReadResult { status: ca_tools::backends::FileReadStatus::NotFound, content: None, error: Some("not found".into()) })
        }
    }

    fn empty_registry() -> ProviderRegistry {
        ProviderRegistry::from_config(&ca_domain::config::LlmConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn execute_single_with_no_agents_fails_immediately() {
        let registry = empty_registry();
        let result = execute_single(&[], &[], &registry, None, &NoopSearch, &NoopFileRead, None, Some("s1")).await;
        assert_eq!(result.status, TurnStatus::Failed);
    }

    #[tokio::test]
    async fn execute_single_with_unresolvable_model_reports_partial() {
        let registry = empty_registry();
        let agents = vec![agent("a")];
        let result = execute_single(&agents, &[], &registry, None, &NoopSearch, &NoopFileRead, None, Some("s1")).await;
        assert_eq!(result.status, TurnStatus::Partial);
        assert!(result.final_text.starts_with(ERROR_MARKER));
    }

    #[tokio::test]
    async fn execute_tagged_with_empty_room_is_rejected() {
        let registry = empty_registry();
        let err = execute_tagged(&[], "@anyone hi", &[], &registry, None, &NoopSearch, &NoopFileRead, None, Some("s1")).await.unwrap_err();
        assert!(matches!(err, Error::Validation { kind: ValidationErrorKind::NoRoomAgents }));
    }

    #[tokio::test]
    async fn execute_tagged_with_no_matching_tag_is_rejected() {
        let registry = empty_registry();
        let agents = vec![agent("alpha")];
        let err = execute_tagged(&agents, "@unknown do work", &[], &registry, None, &NoopSearch, &NoopFileRead, None, Some("s1")).await.unwrap_err();
        assert!(matches!(err, Error::Validation { kind: ValidationErrorKind::NoValidTaggedAgents }));
    }

    #[tokio::test]
    async fn execute_tagged_with_multiple_tags_invokes_each_in_order() {
        let registry = empty_registry();
        let agents = vec![agent("alpha"), agent("beta")];
        let result = execute_tagged(&agents, "@beta and @alpha please help", &[], &registry, None, &NoopSearch, &NoopFileRead, None, Some("s1"))
            .await
            .unwrap();
        assert_eq!(result.per_round_entries.len(), 2);
        assert_eq!(result.per_round_entries[0].agent_key, "beta");
        assert_eq!(result.per_round_entries[1].agent_key, "alpha");
    }

    #[tokio::test]
    async fn execute_roundtable_with_empty_room_is_rejected() {
        let registry = empty_registry();
        let err = execute_roundtable(&[], &[], &registry, None, &NoopSearch, &NoopFileRead, None, Some("s1")).await.unwrap_err();
        assert!(matches!(err, Error::Validation { kind: ValidationErrorKind::NoRoomAgents }));
    }

    #[tokio::test]
    async fn execute_orchestrator_with_empty_room_is_rejected() {
        let registry = empty_registry();
        let err = execute_orchestrator(&[], "hi", &[], &registry, "missing", None, 3, 6, &NoopSearch, &NoopFileRead, None, Some("s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { kind: ValidationErrorKind::NoRoomAgents }));
    }

    #[tokio::test]
    async fn execute_orchestrator_with_unresolvable_manager_model_fails() {
        let registry = empty_registry();
        let agents = vec![agent("a")];
        let result = execute_orchestrator(&agents, "hi", &[], &registry, "missing", None, 3, 6, &NoopSearch, &NoopFileRead, None, Some("s1"))
            .await
            .unwrap();
        assert_eq!(result.status, TurnStatus::Failed);
    }
}
