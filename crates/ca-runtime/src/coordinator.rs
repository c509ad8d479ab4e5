//! Ties context assembly, mode dispatch, usage metering, and
//! persistence together into one turn's atomic execution — the
//! top-level entry point every transport (HTTP handler, CLI, test)
//! calls to run a turn.

use chrono::{DateTime, Utc};

use ca_billing::{PricingCache, UsageMeter};
use ca_context::history::{build_history_messages, MessageRow};
use ca_context::planner::ContextPlanner;
use ca_context::history::{ContextMessage, ContextRole};
use ca_context::summary::{extract_summary_structure, generate_summary_text};
use ca_domain::error::{Error, Result};
use ca_domain::ids::new_id;
use ca_domain::model::{ActiveAgent, RoomMode, TurnStatus, Visibility};
use ca_domain::tool::Message;
use ca_domain::trace::TraceEvent;
use ca_providers::ProviderRegistry;
use ca_persistence::{MemoryPersistence, MessageInsert, SessionSummaryRow, TurnContextAuditRow, TurnRow};
use ca_tools::backends::{FileReadBackend, SearchBackend};

use crate::modes::{execute_orchestrator, execute_roundtable, execute_single, execute_tagged, ModeOutcome};
use crate::rate_gate::RateGate;

/// Everything one turn needs besides the transport-level parameters
/// (the search/file-read backends and the current time, which are
/// passed separately so they can be swapped for stubs in tests).
pub struct TurnRequest {
    pub user_id: String,
    pub room_id: Option<String>,
    pub session_id: String,
    pub turn_index: i64,
    pub mode: RoomMode,
    pub active_agents: Vec<ActiveAgent>,
    /// The routing manager's model alias. Required for [`RoomMode::Orchestrator`].
    pub manager_model_alias: Option<String>,
    pub user_input: String,
    pub max_output_tokens: Option<u32>,
    pub max_rounds: u32,
    pub max_invocations: u32,
}

#[derive(Debug, Clone)]
pub struct TurnResult {
    pub turn_id: String,
    pub status: TurnStatus,
    pub assistant_output: String,
}

/// Coordinates one turn end to end: rate-gates the request, assembles
/// context within the model's token budget, dispatches to the room's
/// mode, meters usage, debits the wallet, and persists everything in
/// one transaction.
pub struct TurnCoordinator {
    registry: ProviderRegistry,
    persistence: MemoryPersistence,
    rate_gate: RateGate,
    planner: ContextPlanner,
    pricing: PricingCache,
}

impl TurnCoordinator {
    pub fn new(
        registry: ProviderRegistry,
        persistence: MemoryPersistence,
        rate_gate: RateGate,
        planner: ContextPlanner,
        pricing: PricingCache,
    ) -> Self {
        Self { registry, persistence, rate_gate, planner, pricing }
    }

    pub async fn execute_turn(
        &self,
        request: TurnRequest,
        search: &dyn SearchBackend,
        file_read: &dyn FileReadBackend,
        now: DateTime<Utc>,
    ) -> Result<TurnResult> {
        self.rate_gate.check_and_record_request(&request.user_id, now)?;

        TraceEvent::TurnStarted {
            session_id: request.session_id.clone(),
            turn_index: request.turn_index,
            room_mode: mode_label(request.mode).into(),
        }
        .emit();

        let primary_agent = request
            .active_agents
            .first()
            .ok_or_else(|| Error::Other("turn has no active agents".into()))?;

        let model_context_limit = self
            .registry
            .resolve(&primary_agent.model_alias)
            .ok()
            .and_then(|r| r.provider.capabilities().context_window_tokens)
            .unwrap_or(8192) as usize;

        let history_rows: Vec<MessageRow> =
            self.persistence.messages_for_session(&request.session_id).iter().map(MessageInsert::as_context_row).collect();

        let is_room = request.active_agents.len() > 1 || request.mode != RoomMode::Standalone;
        let current_agent_key = if request.active_agents.len() == 1 { primary_agent.agent_key.as_deref() } else { None };
        let history_messages = build_history_messages(&history_rows, is_room, current_agent_key, 4);

        let latest_summary = self.persistence.latest_summary(&request.session_id);
        let turn_count_since_summary = self.persistence.turn_count(&request.session_id) as u32;

        let preparation = self.planner.prepare(
            model_context_limit,
            &[],
            &history_messages,
            latest_summary.as_ref().map(|s| s.summary_text.as_str()),
            turn_count_since_summary,
            &request.user_input,
        )?;

        TraceEvent::ContextPrepared {
            estimated_before: preparation.estimated_input_tokens_before,
            estimated_after_prune: preparation.estimated_input_tokens_after_prune,
            summary_triggered: preparation.summary_triggered,
            prune_triggered: preparation.prune_triggered,
        }
        .emit();

        let primary_context_messages = context_messages_to_chat(&preparation.messages);

        let outcome = self.dispatch_mode(&request, &primary_context_messages, search, file_read).await?;

        let turn_id = new_id();
        let mut tx = self.persistence.begin();

        if let (true, Some(from_id), Some(to_id)) =
            (preparation.summary_triggered, &preparation.summary_from_message_id, &preparation.summary_to_message_id)
        {
            if let Ok(resolved) = self.registry.resolve(&primary_agent.model_alias) {
                let excerpt = rolled_up_excerpt(&history_rows, from_id, to_id);
                let mut raw_summary_text = String::new();
                if let Some(prev) = &latest_summary {
                    raw_summary_text.push_str(&prev.summary_text);
                    raw_summary_text.push_str("\n\n");
                }
                raw_summary_text.push_str(&excerpt);

                let generated = generate_summary_text(&raw_summary_text, &resolved.provider, &resolved.model).await?;
                let structure = extract_summary_structure(&generated.summary_text, &resolved.provider, &resolved.model).await?;

                TraceEvent::SummaryGenerated { session_id: request.session_id.clone(), used_fallback: generated.used_fallback }
                    .emit();

                tx.insert_session_summary(SessionSummaryRow {
                    id: new_id(),
                    session_id: request.session_id.clone(),
                    from_message_id: Some(from_id.clone()),
                    to_message_id: Some(to_id.clone()),
                    summary_text: generated.summary_text,
                    key_facts: structure.key_facts,
                    decisions: structure.decisions,
                    open_questions: structure.open_questions,
                    action_items: structure.action_items,
                    created_at: now,
                });
            }
        }

        tx.insert_turn(TurnRow {
            id: turn_id.clone(),
            session_id: request.session_id.clone(),
            turn_index: request.turn_index,
            mode: request.mode,
            user_input: request.user_input.clone(),
            assistant_output: Some(outcome.final_text.clone()),
            status: outcome.status,
            created_at: now,
        });

        tx.insert_message(MessageInsert {
            id: new_id(),
            session_id: request.session_id.clone(),
            turn_id: Some(turn_id.clone()),
            role: "user".into(),
            visibility: Visibility::Shared,
            agent_key: None,
            source_agent_key: None,
            agent_name: None,
            mode: request.mode,
            content: request.user_input.clone(),
            created_at: now,
        });

        for entry in &outcome.per_round_entries {
            tx.insert_message(MessageInsert {
                id: new_id(),
                session_id: request.session_id.clone(),
                turn_id: Some(turn_id.clone()),
                role: "assistant".into(),
                visibility: Visibility::Shared,
                agent_key: Some(entry.agent_key.clone()),
                source_agent_key: Some(entry.agent_key.clone()),
                agent_name: Some(entry.agent_name.clone()),
                mode: request.mode,
                content: entry.text.clone(),
                created_at: now,
            });
        }

        tx.insert_turn_context_audit(TurnContextAuditRow::from_preparation(
            new_id(),
            turn_id.clone(),
            request.session_id.clone(),
            primary_agent.model_alias.clone(),
            &preparation,
            false,
            now,
        ));

        // One LlmCallEvent and one wallet debit per model call in the
        // turn — per-agent calls and manager calls alike — not one
        // aggregated row for the whole turn.
        let total_tokens: i64 = outcome.usage_events.iter().map(|e| e.usage.total_tokens as i64).sum();
        let mut wallet_debit_amount = 0.0_f64;
        for event in &outcome.usage_events {
            let input_fresh = event.usage.prompt_tokens.saturating_sub(event.usage.prompt_tokens_cached) as i64;
            let input_cached = event.usage.prompt_tokens_cached as i64;
            let output = event.usage.completion_tokens as i64;
            let cost_usd = self.pricing.estimate_cost(&event.model_alias, input_fresh.max(0) as u32, output.max(0) as u32);
            let multiplier = self.pricing.get_multiplier(&event.model_alias);

            let mut record = UsageMeter::build_record(
                request.user_id.clone(),
                request.room_id.clone(),
                request.session_id.clone(),
                turn_id.clone(),
                event.model_alias.clone(),
                event.model_alias.clone(),
                input_fresh,
                input_cached,
                output,
                cost_usd,
                multiplier,
                None,
                status_label(outcome.status),
                now,
            );
            record.agent_id = event.agent_key.clone();

            let credits_burned = record.credits_burned;
            wallet_debit_amount += credits_burned;
            tx.insert_llm_call_event(ca_persistence::LlmCallEventRow {
                id: new_id(),
                record,
                direct_session_id: Some(request.session_id.clone()),
                pricing_version: self.pricing.version().to_string(),
            });

            tx.stage_wallet_debit(request.user_id.clone(), credits_burned, Some(turn_id.clone()), None, now);
        }

        for call in &outcome.tool_calls {
            tx.insert_tool_call_event(ca_persistence::ToolCallEventRow {
                id: new_id(),
                user_id: request.user_id.clone(),
                room_id: request.room_id.clone(),
                session_id: request.session_id.clone(),
                turn_id: turn_id.clone(),
                agent_key: None,
                tool_name: call.tool_name.clone(),
                tool_input_json: call.arguments.to_string(),
                tool_output_json: call.output.clone(),
                is_error: call.is_error,
                latency_ms: None,
                credits_charged: rust_decimal::Decimal::ZERO,
                created_at: now,
            });
        }

        tx.commit()?;

        if total_tokens > 0 {
            self.rate_gate.record_tokens(&request.user_id, total_tokens.max(0) as u64, now);
            TraceEvent::WalletDebited {
                user_id: request.user_id.clone(),
                credits_burned: wallet_debit_amount.to_string(),
                new_balance: self.persistence.wallet_balance(&request.user_id).to_string(),
            }
            .emit();
        }

        TraceEvent::TurnFinished {
            session_id: request.session_id.clone(),
            turn_index: request.turn_index,
            status: status_label(outcome.status).into(),
            total_invocations: outcome.per_round_entries.len() as u32,
        }
        .emit();

        Ok(TurnResult { turn_id, status: outcome.status, assistant_output: outcome.final_text })
    }

    async fn dispatch_mode(
        &self,
        request: &TurnRequest,
        primary_context_messages: &[Message],
        search: &dyn SearchBackend,
        file_read: &dyn FileReadBackend,
    ) -> Result<ModeOutcome> {
        let room_id = request.room_id.as_deref();
        let session_id = Some(request.session_id.as_str());

        match request.mode {
            RoomMode::Standalone => Ok(execute_single(
                &request.active_agents,
                primary_context_messages,
                &self.registry,
                request.max_output_tokens,
                search,
                file_read,
                room_id,
                session_id,
            )
            .await),
            RoomMode::Manual | RoomMode::Tag => execute_tagged(
                &request.active_agents,
                &request.user_input,
                primary_context_messages,
                &self.registry,
                request.max_output_tokens,
                search,
                file_read,
                room_id,
                session_id,
            )
            .await,
            RoomMode::Roundtable => execute_roundtable(
                &request.active_agents,
                primary_context_messages,
                &self.registry,
                request.max_output_tokens,
                search,
                file_read,
                room_id,
                session_id,
            )
            .await,
            RoomMode::Orchestrator => {
                let manager_alias = request
                    .manager_model_alias
                    .as_deref()
                    .ok_or_else(|| Error::Config("orchestrator mode requires a manager_model_alias".into()))?;
                execute_orchestrator(
                    &request.active_agents,
                    &request.user_input,
                    primary_context_messages,
                    &self.registry,
                    manager_alias,
                    request.max_output_tokens,
                    request.max_rounds,
                    request.max_invocations,
                    search,
                    file_read,
                    room_id,
                    session_id,
                )
                .await
            }
        }
    }

}

fn mode_label(mode: RoomMode) -> &'static str {
    match mode {
        RoomMode::Manual => "manual",
        RoomMode::Tag => "tag",
        RoomMode::Roundtable => "roundtable",
        RoomMode::Orchestrator => "orchestrator",
        RoomMode::Standalone => "standalone",
    }
}

fn status_label(status: TurnStatus) -> &'static str {
    match status {
        TurnStatus::Running => "running",
        TurnStatus::Partial => "partial",
        TurnStatus::Completed => "completed",
        TurnStatus::Failed => "failed",
    }
}

/// Render the history rows between `from_id` and `to_id` (inclusive) as
/// plain text for folding into a session summary.
fn rolled_up_excerpt(history_rows: &[MessageRow], from_id: &str, to_id: &str) -> String {
    let start = history_rows.iter().position(|r| r.id == from_id);
    let end = history_rows.iter().position(|r| r.id == to_id);

    let (Some(start), Some(end)) = (start, end) else { return String::new() };
    history_rows[start..=end.max(start)]
        .iter()
        .map(|r| format!("{}: {}", r.role, r.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn context_messages_to_chat(messages: &[ContextMessage]) -> Vec<Message> {
    messages
        .iter()
        .map(|m| match m.role {
            ContextRole::System => Message::system(m.content.clone()),
            ContextRole::User => Message::user(m.content.clone()),
            ContextRole::Assistant => Message::assistant(m.content.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ca_domain::config::LlmConfig;
    use ca_domain::config::QuotaConfig;
    use chrono::TimeZone;

    struct NoopSearch;
    #[async_trait]
    impl SearchBackend for NoopSearch {
        async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<ca_tools::backends::SearchResult>> {
            Ok(vec![])
        }
    }

    struct NoopFileRead;
    #[async_trait]
    impl FileReadBackend for NoopFileRead {
        async fn read(&self, _file_id: &str, _room_id: Option<&str>, _session_id: Option<&str>) -> Result<ca_tools::backends::FileReadResult> {
            Ok(ca_tools::backends::FileReadResult {
                status: ca_tools::backends::FileReadStatus::NotFound,
                content: None,
                error: Some("not found".into()),
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn agent() -> ActiveAgent {
        ActiveAgent {
            agent_id: Some("a1".into()),
            agent_key: Some("solo".into()),
            name: "Solo".into(),
            model_alias: "missing".into(),
            role_prompt: "Answer the user directly.".into(),
            tool_permissions: vec![],
        }
    }

    fn coordinator() -> TurnCoordinator {
        TurnCoordinator::new(
            ProviderRegistry::from_config(&LlmConfig::default()).unwrap(),
            MemoryPersistence::new(),
            RateGate::new(QuotaConfig::default()),
            ContextPlanner::new(1024, 0.70, 0.90, 8, 4),
            PricingCache::default(),
        )
    }

    #[tokio::test]
    async fn turn_with_unresolvable_model_still_persists_as_partial() {
        let coordinator = coordinator();
        let request = TurnRequest {
            user_id: "user-1".into(),
            room_id: None,
            session_id: "session-1".into(),
            turn_index: 0,
            mode: RoomMode::Standalone,
            active_agents: vec![agent()],
            manager_model_alias: None,
            user_input: "hello".into(),
            max_output_tokens: None,
            max_rounds: 1,
            max_invocations: 1,
        };

        let result = coordinator.execute_turn(request, &NoopSearch, &NoopFileRead, now()).await.unwrap();
        assert_eq!(result.status, TurnStatus::Partial);
        assert!(result.assistant_output.starts_with("[[agent_error]]"));
        assert_eq!(coordinator.persistence.turn_count("session-1"), 1);
    }

    #[tokio::test]
    async fn second_turn_in_same_session_is_rejected_on_duplicate_index() {
        let coordinator = coordinator();
        let make_request = || TurnRequest {
            user_id: "user-1".into(),
            room_id: None,
            session_id: "session-1".into(),
            turn_index: 0,
            mode: RoomMode::Standalone,
            active_agents: vec![agent()],
            manager_model_alias: None,
            user_input: "hello".into(),
            max_output_tokens: None,
            max_rounds: 1,
            max_invocations: 1,
        };

        coordinator.execute_turn(make_request(), &NoopSearch, &NoopFileRead, now()).await.unwrap();
        let err = coordinator.execute_turn(make_request(), &NoopSearch, &NoopFileRead, now()).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateTurnIndex { .. }));
    }

    #[tokio::test]
    async fn orchestrator_mode_without_manager_alias_is_rejected() {
        let coordinator = coordinator();
        let request = TurnRequest {
            user_id: "user-1".into(),
            room_id: None,
            session_id: "session-1".into(),
            turn_index: 0,
            mode: RoomMode::Orchestrator,
            active_agents: vec![agent()],
            manager_model_alias: None,
            user_input: "hello".into(),
            max_output_tokens: None,
            max_rounds: 2,
            max_invocations: 4,
        };

        let err = coordinator.execute_turn(request, &NoopSearch, &NoopFileRead, now()).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn tag_mode_with_no_matching_tag_persists_nothing() {
        let coordinator = coordinator();
        let request = TurnRequest {
            user_id: "user-1".into(),
            room_id: None,
            session_id: "session-1".into(),
            turn_index: 0,
            mode: RoomMode::Tag,
            active_agents: vec![agent()],
            manager_model_alias: None,
            user_input: "@unknown do work".into(),
            max_output_tokens: None,
            max_rounds: 1,
            max_invocations: 1,
        };

        let err = coordinator.execute_turn(request, &NoopSearch, &NoopFileRead, now()).await.unwrap_err();
        assert!(matches!(err, Error::Validation { kind: ca_domain::ValidationErrorKind::NoValidTaggedAgents }));
        assert_eq!(coordinator.persistence.turn_count("session-1"), 0);
        assert_eq!(coordinator.persistence.wallet_balance("user-1"), rust_decimal::Decimal::ZERO);
    }

    #[tokio::test]
    async fn tag_mode_with_matching_tag_invokes_agent() {
        let coordinator = coordinator();
        let request = TurnRequest {
            user_id: "user-1".into(),
            room_id: None,
            session_id: "session-1".into(),
            turn_index: 0,
            mode: RoomMode::Tag,
            active_agents: vec![agent()],
            manager_model_alias: None,
            user_input: "@solo please help".into(),
            max_output_tokens: None,
            max_rounds: 1,
            max_invocations: 1,
        };

        let result = coordinator.execute_turn(request, &NoopSearch, &NoopFileRead, now()).await.unwrap();
        assert_eq!(result.status, TurnStatus::Partial);
        assert_eq!(coordinator.persistence.turn_count("session-1"), 1);
    }
}
