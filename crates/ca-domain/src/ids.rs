use serde::{Deserialize, Serialize};

/// The resource a [`crate::error::Error::QuotaExceeded`] was raised against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    RequestsPerMinute,
    RequestsPerHour,
    RequestsPerDay,
    TokensPerDay,
}

impl std::fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuotaKind::RequestsPerMinute => "requests_per_minute",
            QuotaKind::RequestsPerHour => "requests_per_hour",
            QuotaKind::RequestsPerDay => "requests_per_day",
            QuotaKind::TokensPerDay => "tokens_per_day",
        };
        f.write_str(s)
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
