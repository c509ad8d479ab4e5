use crate::ids::QuotaKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("provider '{provider}' error: {message}")]
    Provider { provider: String, message: String },

    #[error("unknown model alias: {0}")]
    UnknownModelAlias(String),

    #[error(
        "context budget exceeded: model_limit={model_context_limit} input_budget={input_budget} estimated={estimated_tokens}"
    )]
    ContextBudgetExceeded {
        model_context_limit: usize,
        input_budget: usize,
        estimated_tokens: usize,
    },

    #[error("rate gate exceeded: {kind} used={used} limit={limit}")]
    QuotaExceeded {
        kind: QuotaKind,
        used: u64,
        limit: u64,
    },

    #[error("duplicate turn index {turn_index} for session {session_id}")]
    DuplicateTurnIndex { session_id: String, turn_index: i64 },

    #[error("validation error: {kind}")]
    Validation { kind: ValidationErrorKind },

    #[error("config error: {0}")]
    Config(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

/// Reasons a turn is rejected before any model call or persistence
/// write, distinct from a provider or budget failure mid-turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Manual/tag mode: none of the `@<agent_key>` tags in the user's
    /// input matched an active agent in the room.
    NoValidTaggedAgents,
    /// The room has no active agents at all for the mode being run.
    NoRoomAgents,
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ValidationErrorKind::NoValidTaggedAgents => "no_valid_tagged_agents",
            ValidationErrorKind::NoRoomAgents => "no_room_agents",
        };
        f.write_str(code)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
