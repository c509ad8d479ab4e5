//! Tool dispatch: every call returns `(content, is_error)` and never
//! raises, so the runtime can always feed a tool result back to the
//! model even when the tool itself failed.

use std::time::Instant;

use serde_json::Value;

use ca_domain::trace::TraceEvent;

use crate::backends::{FileReadBackend, FileReadStatus, SearchBackend};
use crate::registry::{FILE_READ, SEARCH};

/// Dispatch one tool call.
///
/// `room_id`/`session_id` scope a `file_read` lookup to the caller's
/// room or direct session — at least one must be set, or the call fails
/// with a descriptive (not panicking) error string.
pub async fn dispatch_tool(
    tool_name: &str,
    arguments: &Value,
    search: &dyn SearchBackend,
    file_read: &dyn FileReadBackend,
    room_id: Option<&str>,
    session_id: Option<&str>,
) -> (String, bool) {
    let started = Instant::now();
    let (content, is_error) = match tool_name {
        SEARCH => dispatch_search(arguments, search).await,
        FILE_READ => dispatch_file_read(arguments, file_read, room_id, session_id).await,
        other => (format!("ToolError: Unknown tool {other}"), true),
    };

    TraceEvent::ToolDispatched {
        tool_name: tool_name.to_string(),
        is_error,
        latency_ms: started.elapsed().as_millis() as u64,
    }
    .emit();

    (content, is_error)
}

async fn dispatch_search(arguments: &Value, search: &dyn SearchBackend) -> (String, bool) {
    let query = match arguments.get("query").and_then(|v| v.as_str()) {
        Some(q) if !q.is_empty() => q,
        _ => return ("Tool Error: missing required argument: query".into(), true),
    };

    match search.search(query, 5).await {
        Ok(results) if results.is_empty() => ("- No search results returned.".into(), false),
        Ok(results) => {
            let lines: Vec<String> = results
                .iter()
                .map(|r| {
                    let title = if r.title.is_empty() { "(untitled)" } else { &r.title };
                    let url = if r.url.is_empty() { "(no-url)" } else { &r.url };
                    format!("- {title} | {url} | {}", r.snippet)
                })
                .collect();
            (lines.join("\n"), false)
        }
        Err(e) => (format!("Tool Error: {e}"), true),
    }
}

async fn dispatch_file_read(
    arguments: &Value,
    file_read: &dyn FileReadBackend,
    room_id: Option<&str>,
    session_id: Option<&str>,
) -> (String, bool) {
    let file_id = match arguments.get("file_id").and_then(|v| v.as_str()) {
        Some(id) if !id.is_empty() => id,
        _ => return ("Tool Error: missing required argument: file_id".into(), true),
    };

    if room_id.is_none() && session_id.is_none() {
        return ("File read is unavailable without an active room or session scoped context.".into(), true);
    }

    match file_read.read(file_id, room_id, session_id).await {
        Ok(result) => match result.status {
            FileReadStatus::Completed => (result.content.unwrap_or_default(), false),
            _ => (result.error.unwrap_or_else(|| "File read failed.".into()), true),
        },
        Err(e) => (format!("Tool Error: {e}"), true),
    }
}
