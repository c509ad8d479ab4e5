//! Cheap, provider-independent token estimation used to keep a turn's
//! prompt inside its model's context window before ever calling out to a
//! provider.

use crate::history::ContextMessage;

/// Estimate the token count of a single string.
///
/// `ceil(chars / 4 * 1.25)`, floored at 1 for non-empty input. This is a
/// rough English-text heuristic, not a tokenizer; it exists to keep the
/// budget check cheap and provider-agnostic.
pub fn estimate_tokens_text(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count() as f64;
    ((chars / 4.0 * 1.25).ceil() as usize).max(1)
}

/// Sum [`estimate_tokens_text`] over every message's content.
pub fn estimate_tokens(messages: &[ContextMessage]) -> usize {
    messages.iter().map(|m| estimate_tokens_text(&m.content)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero() {
        assert_eq!(estimate_tokens_text(""), 0);
    }

    #[test]
    fn short_text_floors_at_one() {
        assert_eq!(estimate_tokens_text("a"), 1);
    }

    #[test]
    fn scales_with_length() {
        let text = "a".repeat(400);
        assert_eq!(estimate_tokens_text(&text), 125);
    }
}
