//! In-memory, transactional persistence for a session's turns.
//!
//! Mirrors the gateway's session store in spirit — plain maps behind a
//! lock — but groups a turn's writes (turn row, messages, context audit,
//! usage events, wallet debit) into a staged transaction so they land
//! together or not at all, the way a single DB transaction would.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use ca_billing::{CreditTransaction, CreditWallet, WalletLedger};
use ca_domain::error::{Error, Result};

use crate::entities::{
    LlmCallEventRow, MessageInsert, SessionSummaryRow, ToolCallEventRow, TurnContextAuditRow, TurnRow,
};

#[derive(Default)]
struct Store {
    turns: Vec<TurnRow>,
    turn_index_by_session: HashMap<String, Vec<i64>>,
    messages: Vec<MessageInsert>,
    summaries: Vec<SessionSummaryRow>,
    context_audits: Vec<TurnContextAuditRow>,
    llm_call_events: Vec<LlmCallEventRow>,
    tool_call_events: Vec<ToolCallEventRow>,
    wallets: HashMap<String, CreditWallet>,
    wallet_transactions: Vec<CreditTransaction>,
}

/// Pending writes staged by one turn, applied atomically on [`MemoryTx::commit`].
enum Op {
    Turn(TurnRow),
    Message(MessageInsert),
    Summary(SessionSummaryRow),
    ContextAudit(TurnContextAuditRow),
    LlmCallEvent(LlmCallEventRow),
    ToolCallEvent(ToolCallEventRow),
    WalletDebit { user_id: String, credits_burned: f64, reference_id: Option<String>, note: Option<String>, now: DateTime<Utc> },
    WalletGrant { user_id: String, amount: f64, reference_id: Option<String>, note: Option<String>, now: DateTime<Utc> },
}

/// Reference store. Cheap to clone — the inner maps live behind an `Arc`.
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    inner: Arc<RwLock<Store>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> MemoryTx<'_> {
        MemoryTx { store: self, ops: Vec::new() }
    }

    pub fn messages_for_session(&self, session_id: &str) -> Vec<MessageInsert> {
        self.inner.read().messages.iter().filter(|m| m.session_id == session_id).cloned().collect()
    }

    pub fn latest_summary(&self, session_id: &str) -> Option<SessionSummaryRow> {
        self.inner
            .read()
            .summaries
            .iter()
            .filter(|s| s.session_id == session_id)
            .max_by_key(|s| s.created_at)
            .cloned()
    }

    pub fn tool_events_for_turn(&self, turn_id: &str) -> Vec<ToolCallEventRow> {
        self.inner.read().tool_call_events.iter().filter(|e| e.turn_id == turn_id).cloned().collect()
    }

    pub fn wallet_balance(&self, user_id: &str) -> Decimal {
        self.inner.read().wallets.get(user_id).map(|w| w.balance).unwrap_or(Decimal::ZERO)
    }

    pub fn turn_count(&self, session_id: &str) -> usize {
        self.inner
            .read()
            .turn_index_by_session
            .get(session_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

/// A buffered transaction over a [`MemoryPersistence`]. Nothing written
/// through `insert_*`/`stage_*` is visible to readers until [`Self::commit`]
/// succeeds; [`Self::rollback`] (or simply dropping the transaction)
/// discards the buffer untouched.
pub struct MemoryTx<'a> {
    store: &'a MemoryPersistence,
    ops: Vec<Op>,
}

impl<'a> MemoryTx<'a> {
    pub fn insert_turn(&mut self, turn: TurnRow) {
        self.ops.push(Op::Turn(turn));
    }

    pub fn insert_message(&mut self, message: MessageInsert) {
        self.ops.push(Op::Message(message));
    }

    pub fn insert_session_summary(&mut self, summary: SessionSummaryRow) {
        self.ops.push(Op::Summary(summary));
    }

    pub fn insert_turn_context_audit(&mut self, audit: TurnContextAuditRow) {
        self.ops.push(Op::ContextAudit(audit));
    }

    pub fn insert_llm_call_event(&mut self, event: LlmCallEventRow) {
        self.ops.push(Op::LlmCallEvent(event));
    }

    pub fn insert_tool_call_event(&mut self, event: ToolCallEventRow) {
        self.ops.push(Op::ToolCallEvent(event));
    }

    pub fn stage_wallet_debit(
        &mut self,
        user_id: impl Into<String>,
        credits_burned: f64,
        reference_id: Option<String>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.ops.push(Op::WalletDebit { user_id: user_id.into(), credits_burned, reference_id, note, now });
    }

    pub fn stage_wallet_grant(
        &mut self,
        user_id: impl Into<String>,
        amount: f64,
        reference_id: Option<String>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.ops.push(Op::WalletGrant { user_id: user_id.into(), amount, reference_id, note, now });
    }

    /// Discard every staged write. A transaction that is simply dropped
    /// without calling `commit` has the same effect.
    pub fn rollback(self) {}

    /// Validate and apply every staged write in one step. Validation
    /// (currently: `(session_id, turn_index)` uniqueness) runs against
    /// the committed store plus the rest of this transaction's own
    /// staged turns before anything is written, so a rejected commit
    /// never applies a partial set of writes.
    pub fn commit(self) -> Result<()> {
        let mut guard = self.store.inner.write();

        for op in &self.ops {
            if let Op::Turn(turn) = op {
                let existing = guard.turn_index_by_session.get(&turn.session_id);
                if existing.is_some_and(|idxs| idxs.contains(&turn.turn_index)) {
                    return Err(Error::DuplicateTurnIndex {
                        session_id: turn.session_id.clone(),
                        turn_index: turn.turn_index,
                    });
                }
            }
        }

        for op in self.ops {
            match op {
                Op::Turn(turn) => {
                    guard
                        .turn_index_by_session
                        .entry(turn.session_id.clone())
                        .or_default()
                        .push(turn.turn_index);
                    guard.turns.push(turn);
                }
                Op::Message(message) => guard.messages.push(message),
                Op::Summary(summary) => guard.summaries.push(summary),
                Op::ContextAudit(audit) => guard.context_audits.push(audit),
                Op::LlmCallEvent(event) => guard.llm_call_events.push(event),
                Op::ToolCallEvent(event) => guard.tool_call_events.push(event),
                Op::WalletDebit { user_id, credits_burned, reference_id, note, now } => {
                    let wallet = guard.wallets.entry(user_id.clone()).or_insert_with(|| CreditWallet::new(user_id, now));
                    let txn = WalletLedger::stage_debit(wallet, credits_burned, reference_id, note, now);
                    guard.wallet_transactions.push(txn);
                }
                Op::WalletGrant { user_id, amount, reference_id, note, now } => {
                    let wallet = guard.wallets.entry(user_id.clone()).or_insert_with(|| CreditWallet::new(user_id, now));
                    let txn = WalletLedger::stage_grant(wallet, amount, reference_id, note, now);
                    guard.wallet_transactions.push(txn);
                }
            }
        }

        Ok(())
    }
}
