//! Token-budget enforcement: decides whether a turn's prompt needs
//! summarizing, pruning, or neither before it is sent to a provider.

use ca_domain::{Error, Result};

use crate::history::{ContextMessage, ContextRole, HistoryMessage};
use crate::token_estimator::estimate_tokens;

/// The fully assembled prompt for a turn, plus the bookkeeping a caller
/// needs to decide whether to run the summary pipeline and what to write
/// into the turn's context audit row.
#[derive(Debug, Clone)]
pub struct ContextPreparation {
    pub messages: Vec<ContextMessage>,
    pub model_context_limit: usize,
    pub input_budget: usize,
    pub output_reserve: usize,
    pub overhead_reserve: usize,
    pub estimated_input_tokens_before: usize,
    pub estimated_input_tokens_after_summary: usize,
    pub estimated_input_tokens_after_prune: usize,
    pub summary_triggered: bool,
    pub prune_triggered: bool,
    /// Present when `summary_triggered`: the inclusive id range of history
    /// messages that should be folded into a new session summary.
    pub summary_from_message_id: Option<String>,
    pub summary_to_message_id: Option<String>,
}

/// Computes the input-token budget for a model and fits a turn's prompt
/// into it, summarizing and pruning history as needed.
#[derive(Debug, Clone)]
pub struct ContextPlanner {
    max_output_tokens: usize,
    summary_trigger_ratio: f64,
    prune_trigger_ratio: f64,
    mandatory_summary_turn: u32,
    recent_turns_to_keep: u32,
}

impl ContextPlanner {
    pub fn new(
        max_output_tokens: usize,
        summary_trigger_ratio: f64,
        prune_trigger_ratio: f64,
        mandatory_summary_turn: u32,
        recent_turns_to_keep: u32,
    ) -> Self {
        Self {
            max_output_tokens: max_output_tokens.max(256),
            summary_trigger_ratio: summary_trigger_ratio.clamp(0.1, 1.0),
            prune_trigger_ratio: prune_trigger_ratio.clamp(summary_trigger_ratio, 1.0),
            mandatory_summary_turn: mandatory_summary_turn.max(1),
            recent_turns_to_keep: recent_turns_to_keep.max(1),
        }
    }

    /// Assemble the prompt for a turn, triggering summarization and/or
    /// pruning as the budget requires.
    ///
    /// `system_messages` are the agent's role prompt and any fixed
    /// preamble; `history_messages` is the full conversation history
    /// already filtered by [`crate::history::build_history_messages`];
    /// `latest_summary_text` is the most recent [`ca_domain`]-level
    /// session summary, if one exists.
    ///
    /// Returns [`Error::ContextBudgetExceeded`] when the turn does not fit
    /// even after history is pruned to empty.
    #[allow(clippy::too_many_arguments)]
    pub fn prepare(
        &self,
        model_context_limit: usize,
        system_messages: &[ContextMessage],
        history_messages: &[HistoryMessage],
        latest_summary_text: Option<&str>,
        turn_count_since_last_summary: u32,
        user_input: &str,
    ) -> Result<ContextPreparation> {
        let model_limit = model_context_limit.max(2048);
        let output_reserve = self.max_output_tokens.min((model_limit as f64 * 0.20).floor() as usize);
        let overhead_reserve = 1024.max((model_limit as f64 * 0.05).floor() as usize);
        let input_budget = model_limit
            .checked_sub(output_reserve)
            .and_then(|v| v.checked_sub(overhead_reserve));

        let input_budget = match input_budget {
            Some(b) if b > 0 => b,
            _ => {
                return Err(Error::ContextBudgetExceeded {
                    model_context_limit: model_limit,
                    input_budget: 0,
                    estimated_tokens: 0,
                })
            }
        };

        let mut base_messages = vec![ContextMessage::new(ContextRole::System, "--- SYSTEM ---")];
        base_messages.extend(system_messages.iter().cloned());
        if let Some(summary) = latest_summary_text {
            if !summary.is_empty() {
                base_messages.push(ContextMessage::new(
                    ContextRole::System,
                    format!("Session summary: {summary}"),
                ));
            }
        }

        let raw_history: Vec<ContextMessage> = history_messages
            .iter()
            .map(|m| ContextMessage::new(m.role, m.content.clone()))
            .collect();
        let history_block = if raw_history.is_empty() {
            Vec::new()
        } else {
            let mut block = vec![ContextMessage::new(ContextRole::System, "--- HISTORY ---")];
            block.extend(raw_history);
            block
        };

        let mut before_messages = base_messages.clone();
        before_messages.extend(history_block);
        before_messages.push(ContextMessage::new(ContextRole::System, "--- CURRENT TURN ---"));
        before_messages.push(ContextMessage::new(ContextRole::User, user_input));
        let estimated_before = estimate_tokens(&before_messages);

        let mut summary_triggered = false;
        let mut summary_from_message_id = None;
        let mut summary_to_message_id = None;
        let mut working_history: Vec<HistoryMessage> = history_messages.to_vec();

        let should_summarize = estimated_before
            >= (input_budget as f64 * self.summary_trigger_ratio) as usize
            || turn_count_since_last_summary >= self.mandatory_summary_turn;

        if should_summarize {
            let keep = (self.recent_turns_to_keep as usize) * 2;
            let summarize_cutoff = working_history.len().saturating_sub(keep);
            let summarizable = &working_history[..summarize_cutoff];
            if !summarizable.is_empty() {
                summary_triggered = true;
                summary_from_message_id = Some(summarizable[0].id.clone());
                summary_to_message_id = Some(summarizable[summarizable.len() - 1].id.clone());
                working_history = working_history.split_off(summarize_cutoff);
            }
        }

        let assemble = |base: &[ContextMessage], hist: &[HistoryMessage], input: &str| {
            let mut messages = base.to_vec();
            messages.extend(hist.iter().map(|m| ContextMessage::new(m.role, m.content.clone())));
            messages.push(ContextMessage::new(ContextRole::User, input));
            messages
        };

        let current_messages = assemble(&base_messages, &working_history, user_input);
        let estimated_after_summary = estimate_tokens(&current_messages);

        let mut prune_triggered = false;
        let estimated_after_prune;

        if estimated_after_summary >= (input_budget as f64 * self.prune_trigger_ratio) as usize {
            prune_triggered = true;
            let mut fitted = assemble(&base_messages, &working_history, user_input);
            while !working_history.is_empty() {
                working_history.remove(0);
                fitted = assemble(&base_messages, &working_history, user_input);
                if estimate_tokens(&fitted) <= input_budget {
                    break;
                }
            }

            let final_estimate = estimate_tokens(&fitted);
            if final_estimate > input_budget {
                return Err(Error::ContextBudgetExceeded {
                    model_context_limit: model_limit,
                    input_budget,
                    estimated_tokens: final_estimate,
                });
            }
            estimated_after_prune = final_estimate;
        } else {
            estimated_after_prune = estimated_after_summary;
        }

        let final_history_block = if working_history.is_empty() {
            Vec::new()
        } else {
            let mut block = vec![ContextMessage::new(ContextRole::System, "--- HISTORY ---")];
            block.extend(working_history.iter().map(|m| ContextMessage::new(m.role, m.content.clone())));
            block
        };

        let mut final_messages = base_messages;
        final_messages.extend(final_history_block);
        final_messages.push(ContextMessage::new(ContextRole::System, "--- CURRENT TURN ---"));
        final_messages.push(ContextMessage::new(ContextRole::User, user_input));

        Ok(ContextPreparation {
            messages: final_messages,
            model_context_limit: model_limit,
            input_budget,
            output_reserve,
            overhead_reserve,
            estimated_input_tokens_before: estimated_before,
            estimated_input_tokens_after_summary: estimated_after_summary,
            estimated_input_tokens_after_prune: estimated_after_prune,
            summary_triggered,
            prune_triggered,
            summary_from_message_id,
            summary_to_message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> ContextPlanner {
        ContextPlanner::new(1024, 0.70, 0.90, 8, 4)
    }

    fn hist(id: &str, role: ContextRole, content: &str) -> HistoryMessage {
        HistoryMessage { id: id.into(), role, content: content.into(), turn_id: None }
    }

    #[test]
    fn small_turn_triggers_nothing() {
        let p = planner();
        let result = p
            .prepare(8192, &[], &[], None, 0, "hello")
            .unwrap();
        assert!(!result.summary_triggered);
        assert!(!result.prune_triggered);
    }

    #[test]
    fn mandatory_summary_turn_forces_summarization() {
        let p = planner();
        let history: Vec<HistoryMessage> = (0..20)
            .map(|i| hist(&format!("m{i}"), ContextRole::User, "short message"))
            .collect();
        let result = p
            .prepare(8192, &[], &history, None, 8, "hello")
            .unwrap();
        assert!(result.summary_triggered);
        assert!(result.summary_from_message_id.is_some());
    }

    #[test]
    fn input_exceeding_budget_at_the_model_limit_floor_is_rejected() {
        let p = planner();
        // `model_context_limit` is floored at 2048, leaving an
        // input_budget of 615 tokens once output/overhead reserves are
        // taken out (409 + 1024). With no history to prune, a turn input
        // alone past that budget has nothing left to drop.
        let giant_input = "x".repeat(4000);
        let err = p.prepare(2048, &[], &[], None, 0, &giant_input).unwrap_err();
        assert!(matches!(err, Error::ContextBudgetExceeded { .. }));
    }

    #[test]
    fn huge_single_turn_prunes_then_overflows() {
        let p = planner();
        let giant_input = "x".repeat(100_000);
        let history = vec![hist("m0", ContextRole::User, "hi")];
        let err = p.prepare(2048 * 4, &[], &history, None, 0, &giant_input);
        assert!(err.is_err());
    }
}
