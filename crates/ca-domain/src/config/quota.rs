use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed-window RateGate limits, with optional per-agent overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "d_60")]
    pub requests_per_minute: u64,
    #[serde(default = "d_1000")]
    pub requests_per_hour: u64,
    #[serde(default = "d_5000")]
    pub requests_per_day: u64,
    #[serde(default = "d_1_000_000")]
    pub tokens_per_day: u64,
    #[serde(default)]
    pub overrides: HashMap<String, QuotaOverride>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_hour: 1_000,
            requests_per_day: 5_000,
            tokens_per_day: 1_000_000,
            overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QuotaOverride {
    pub requests_per_minute: Option<u64>,
    pub requests_per_hour: Option<u64>,
    pub requests_per_day: Option<u64>,
    pub tokens_per_day: Option<u64>,
}

fn d_60() -> u64 {
    60
}
fn d_1000() -> u64 {
    1_000
}
fn d_5000() -> u64 {
    5_000
}
fn d_1_000_000() -> u64 {
    1_000_000
}
