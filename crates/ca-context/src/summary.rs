//! Generates the session-summary text and structured facts/decisions
//! extraction used when [`crate::planner::ContextPlanner`] rolls old
//! history into a [`ca_domain`]-level session summary.

use std::sync::Arc;

use ca_domain::json_fence::strip_json_fences;
use ca_domain::tool::Message;
use ca_domain::Result;
use ca_providers::traits::{ChatRequest, LlmProvider};
use serde::Deserialize;

/// Result of rewriting a raw rolled-up summary into a concise one.
#[derive(Debug, Clone)]
pub struct SummaryGenerationResult {
    pub summary_text: String,
    /// `true` when the model's response could not be parsed and the
    /// caller received the first 1200 characters of the raw input
    /// instead. Never an error: a degraded summary still lets the turn
    /// proceed.
    pub used_fallback: bool,
}

/// Structured facts pulled out of a summary for downstream display.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryStructure {
    #[serde(default)]
    pub key_facts: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
}

#[derive(Deserialize)]
struct GenerationResponse {
    summary_text: String,
}

/// Rewrite `raw_summary_text` into a concise, high-signal executive
/// summary using `model`. Falls back to the first 1200 characters of the
/// raw text, verbatim, on any parse failure — this never returns an
/// error, since a degraded summary is always better than blocking the
/// turn on a flaky model response.
pub async fn generate_summary_text(
    raw_summary_text: &str,
    provider: &Arc<dyn LlmProvider>,
    model: &str,
) -> Result<SummaryGenerationResult> {
    let prompt = format!(
        "Rewrite the provided session summary into a concise, high-signal executive summary.\n\
         Keep facts and decisions accurate, avoid speculation, and keep it under 220 words.\n\n\
         Input summary:\n{raw_summary_text}\n\n\
         Respond ONLY with valid JSON in exactly this format:\n\
         {{\n  \"summary_text\": \"...\"\n}}\n\n\
         Do not include any other text, explanation, or markdown."
    );

    let req = ChatRequest {
        messages: vec![Message::system(prompt)],
        max_tokens: Some(512),
        model: Some(model.to_string()),
        ..Default::default()
    };

    let fallback_text: String = raw_summary_text.trim().chars().take(1200).collect();

    let response = match provider.chat(req).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "summary generator request failed; using deterministic fallback summary");
            return Ok(SummaryGenerationResult { summary_text: fallback_text, used_fallback: true });
        }
    };

    let cleaned = strip_json_fences(&response.content);
    match serde_json::from_str::<GenerationResponse>(&cleaned) {
        Ok(parsed) => {
            let summary_text = parsed.summary_text.trim().to_string();
            if summary_text.is_empty() {
                tracing::warn!("summary generator returned blank summary_text; using fallback");
                Ok(SummaryGenerationResult { summary_text: fallback_text, used_fallback: true })
            } else {
                Ok(SummaryGenerationResult { summary_text, used_fallback: false })
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "summary generator failed to parse response JSON; using fallback");
            Ok(SummaryGenerationResult { summary_text: fallback_text, used_fallback: true })
        }
    }
}

/// Extract key facts, decisions, open questions, and action items from a
/// summary. Falls back to all-empty lists on any parse failure — never
/// an error, for the same reason as [`generate_summary_text`].
pub async fn extract_summary_structure(
    summary_text: &str,
    provider: &Arc<dyn LlmProvider>,
    model: &str,
) -> Result<SummaryStructure> {
    let prompt = format!(
        "Given the following session summary, extract structured information.\n\n\
         Summary:\n{summary_text}\n\n\
         Respond ONLY with valid JSON in exactly this format:\n\
         {{\n  \"key_facts\": [\"...\"],\n  \"decisions\": [\"...\"],\n  \
         \"open_questions\": [\"...\"],\n  \"action_items\": [\"...\"]\n}}\n\n\
         All values must be JSON arrays of strings. Use [] if none apply.\n\
         Do not include any other text, explanation, or markdown."
    );

    let req = ChatRequest {
        messages: vec![Message::system(prompt)],
        max_tokens: Some(512),
        model: Some(model.to_string()),
        ..Default::default()
    };

    let response = match provider.chat(req).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "summary extractor request failed; returning empty structure");
            return Ok(SummaryStructure::default());
        }
    };

    let cleaned = strip_json_fences(&response.content);
    match serde_json::from_str::<SummaryStructure>(&cleaned) {
        Ok(mut parsed) => {
            for field in [
                &mut parsed.key_facts,
                &mut parsed.decisions,
                &mut parsed.open_questions,
                &mut parsed.action_items,
            ] {
                field.retain(|s| !s.trim().is_empty());
                for item in field.iter_mut() {
                    *item = item.trim().to_string();
                }
            }
            Ok(parsed)
        }
        Err(e) => {
            tracing::warn!(error = %e, "summary extractor failed to parse response JSON; returning empty structure");
            Ok(SummaryStructure::default())
        }
    }
}
