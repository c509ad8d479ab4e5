//! Structured trace events emitted across the workspace, one `tracing::info!`
//! call per event with the event itself serialized as a JSON field so log
//! aggregators can index on `event`.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TurnStarted {
        session_id: String,
        turn_index: i64,
        room_mode: String,
    },
    TurnFinished {
        session_id: String,
        turn_index: i64,
        status: String,
        total_invocations: u32,
    },
    AgentInvoked {
        agent_key: Option<String>,
        model_alias: String,
        success: bool,
    },
    ToolDispatched {
        tool_name: String,
        is_error: bool,
        latency_ms: u64,
    },
    ContextPrepared {
        estimated_before: usize,
        estimated_after_prune: usize,
        summary_triggered: bool,
        prune_triggered: bool,
    },
    SummaryGenerated {
        session_id: String,
        used_fallback: bool,
    },
    RoutingDecided {
        selected_agent_keys: Vec<String>,
        fallback_used: bool,
    },
    WalletDebited {
        user_id: String,
        credits_burned: String,
        new_balance: String,
    },
    QuotaRejected {
        user_id: String,
        kind: String,
        used: u64,
        limit: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ca_event");
    }
}
