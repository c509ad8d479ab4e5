//! Row shapes persisted across a turn. These mirror the original
//! system's table columns; an in-memory store keeps them as plain
//! structs instead of JSON-text columns where the original had to
//! flatten lists into `_json` text fields.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use ca_context::history::MessageRow;
use ca_context::planner::ContextPreparation;
use ca_domain::model::{RoomMode, TurnStatus, Visibility};

#[derive(Debug, Clone)]
pub struct TurnRow {
    pub id: String,
    pub session_id: String,
    pub turn_index: i64,
    pub mode: RoomMode,
    pub user_input: String,
    pub assistant_output: Option<String>,
    pub status: TurnStatus,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to persist one message row. Carries the fields
/// [`MessageRow`] doesn't need for context assembly (`session_id`,
/// `mode`) alongside the ones it does, so a stored row can be narrowed
/// to a `MessageRow` for free on the read path.
#[derive(Debug, Clone)]
pub struct MessageInsert {
    pub id: String,
    pub session_id: String,
    pub turn_id: Option<String>,
    pub role: String,
    pub visibility: Visibility,
    pub agent_key: Option<String>,
    pub source_agent_key: Option<String>,
    pub agent_name: Option<String>,
    pub mode: RoomMode,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageInsert {
    pub fn as_context_row(&self) -> MessageRow {
        MessageRow {
            id: self.id.clone(),
            turn_id: self.turn_id.clone(),
            role: self.role.clone(),
            visibility: self.visibility,
            agent_key: self.agent_key.clone(),
            source_agent_key: self.source_agent_key.clone(),
            agent_name: self.agent_name.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSummaryRow {
    pub id: String,
    pub session_id: String,
    pub from_message_id: Option<String>,
    pub to_message_id: Option<String>,
    pub summary_text: String,
    pub key_facts: Vec<String>,
    pub decisions: Vec<String>,
    pub open_questions: Vec<String>,
    pub action_items: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TurnContextAuditRow {
    pub id: String,
    pub turn_id: String,
    pub session_id: String,
    pub model_alias: String,
    pub model_context_limit: usize,
    pub input_budget: usize,
    pub estimated_input_tokens_before: usize,
    pub estimated_input_tokens_after_summary: usize,
    pub estimated_input_tokens_after_prune: usize,
    pub summary_triggered: bool,
    pub prune_triggered: bool,
    pub overflow_rejected: bool,
    pub output_reserve: usize,
    pub overhead_reserve: usize,
    pub created_at: DateTime<Utc>,
}

impl TurnContextAuditRow {
    /// Build an audit row from a planner's output. `overflow_rejected`
    /// is passed separately since the planner signals overflow by
    /// returning an error rather than a field on a successful result.
    pub fn from_preparation(
        id: String,
        turn_id: String,
        session_id: String,
        model_alias: String,
        prep: &ContextPreparation,
        overflow_rejected: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            turn_id,
            session_id,
            model_alias,
            model_context_limit: prep.model_context_limit,
            input_budget: prep.input_budget,
            estimated_input_tokens_before: prep.estimated_input_tokens_before,
            estimated_input_tokens_after_summary: prep.estimated_input_tokens_after_summary,
            estimated_input_tokens_after_prune: prep.estimated_input_tokens_after_prune,
            summary_triggered: prep.summary_triggered,
            prune_triggered: prep.prune_triggered,
            overflow_rejected,
            output_reserve: prep.output_reserve,
            overhead_reserve: prep.overhead_reserve,
            created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmCallEventRow {
    pub id: String,
    pub record: ca_billing::UsageRecord,
    pub direct_session_id: Option<String>,
    pub pricing_version: String,
}

#[derive(Debug, Clone)]
pub struct ToolCallEventRow {
    pub id: String,
    pub user_id: String,
    pub room_id: Option<String>,
    pub session_id: String,
    pub turn_id: String,
    pub agent_key: Option<String>,
    pub tool_name: String,
    pub tool_input_json: String,
    pub tool_output_json: String,
    pub is_error: bool,
    pub latency_ms: Option<i64>,
    pub credits_charged: Decimal,
    pub created_at: DateTime<Utc>,
}
