//! Pure usage-metering math: turns raw token counts into the weighted
//! `oe_tokens` figure and the credits a turn burns.

use chrono::{DateTime, Utc};

/// Weighted "output-equivalent tokens" for a single model call.
///
/// Fresh input tokens are weighted at 0.35, cached input tokens (served
/// from a provider-side prompt cache) at 0.10, and output tokens at 1.0 —
/// cached tokens are far cheaper to serve than fresh ones, so they burn
/// proportionally fewer credits. Each input is clamped to zero first so a
/// malformed usage report can never drive the total negative.
pub fn compute_oe_tokens(input_tokens_fresh: i64, input_tokens_cached: i64, output_tokens: i64) -> f64 {
    let fresh = input_tokens_fresh.max(0) as f64;
    let cached = input_tokens_cached.max(0) as f64;
    let output = output_tokens.max(0) as f64;
    fresh * 0.35 + cached * 0.10 + output
}

/// Credits burned for a given `oe_tokens` figure: `oe_tokens *
/// multiplier / 10_000`, floored at zero. `multiplier` comes from
/// [`crate::pricing::PricingCache::get_multiplier`] — `1.0` for any
/// model alias with no configured pricing row.
pub fn compute_credits_burned(oe_tokens: f64, multiplier: f64) -> f64 {
    oe_tokens.max(0.0) * multiplier / 10_000.0
}

/// Everything needed to write one `LlmCallEvent` row for a single model
/// call within a turn.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub user_id: String,
    pub room_id: Option<String>,
    pub session_id: String,
    pub turn_id: String,
    pub model_alias: String,
    pub provider_model: String,
    pub provider: String,
    pub input_tokens_fresh: i64,
    pub input_tokens_cached: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub oe_tokens_computed: f64,
    pub provider_cost_usd: f64,
    pub credits_burned: f64,
    pub latency_ms: Option<i64>,
    pub status: String,
    pub step_id: Option<String>,
    pub agent_id: Option<String>,
    pub request_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Builds a [`UsageRecord`] from the raw numbers a provider call
/// produced, applying the `oe_tokens`/`credits_burned` formulas (the
/// latter using the alias's [`crate::pricing::PricingCache::get_multiplier`])
/// and an optional dollar-cost estimate from a
/// [`crate::pricing::PricingCache`].
pub struct UsageMeter;

impl UsageMeter {
    #[allow(clippy::too_many_arguments)]
    pub fn build_record(
        user_id: impl Into<String>,
        room_id: Option<String>,
        session_id: impl Into<String>,
        turn_id: impl Into<String>,
        model_alias: impl Into<String>,
        provider_model: impl Into<String>,
        input_tokens_fresh: i64,
        input_tokens_cached: i64,
        output_tokens: i64,
        provider_cost_usd: f64,
        credits_multiplier: f64,
        latency_ms: Option<i64>,
        status: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> UsageRecord {
        let oe_tokens = compute_oe_tokens(input_tokens_fresh, input_tokens_cached, output_tokens);
        let credits_burned = compute_credits_burned(oe_tokens, credits_multiplier);
        let total_tokens = input_tokens_fresh.max(0) + input_tokens_cached.max(0) + output_tokens.max(0);

        UsageRecord {
            user_id: user_id.into(),
            room_id,
            session_id: session_id.into(),
            turn_id: turn_id.into(),
            model_alias: model_alias.into(),
            provider_model: provider_model.into(),
            provider: "openrouter".into(),
            input_tokens_fresh,
            input_tokens_cached,
            output_tokens,
            total_tokens,
            oe_tokens_computed: oe_tokens,
            provider_cost_usd,
            credits_burned,
            latency_ms,
            status: status.into(),
            step_id: None,
            agent_id: None,
            request_id: None,
            recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oe_tokens_weights_fresh_cached_output() {
        let oe = compute_oe_tokens(100, 200, 50);
        assert!((oe - (100.0 * 0.35 + 200.0 * 0.10 + 50.0)).abs() < 1e-9);
    }

    #[test]
    fn oe_tokens_clamps_negative_inputs() {
        let oe = compute_oe_tokens(-10, -5, 20);
        assert_eq!(oe, 20.0);
    }

    #[test]
    fn credits_burned_scales_by_ten_thousand() {
        assert!((compute_credits_burned(10_000.0, 1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn credits_burned_floors_at_zero() {
        assert_eq!(compute_credits_burned(-5.0, 1.0), 0.0);
    }

    #[test]
    fn credits_burned_scales_by_multiplier() {
        assert!((compute_credits_burned(10_000.0, 2.5) - 2.5).abs() < 1e-12);
    }
}
