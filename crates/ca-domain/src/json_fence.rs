//! Strip a single markdown code fence LLMs commonly wrap JSON replies in.
//!
//! Shared by `ca-context`'s summary pipeline and `ca-runtime`'s routing
//! manager — both ask a model for a bare JSON object back and both need the
//! exact same tolerance for a ```` ```json ... ``` ```` wrapper.

use std::sync::OnceLock;

use regex::Regex;

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("static fence regex is valid")
    })
}

/// Trim `text` and, if it contains a fenced block, return the block's inner
/// content. If no fence is found, the trimmed text is returned unchanged.
pub fn strip_json_fences(text: &str) -> String {
    let trimmed = text.trim();
    match fence_pattern().captures(trimmed) {
        Some(caps) => caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| trimmed.to_string()),
        None => trimmed.to_string(),
    }
}
