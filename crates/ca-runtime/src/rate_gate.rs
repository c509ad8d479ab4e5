//! Fixed-window request and token quota enforcement, per principal
//! (typically a user id). Mirrors the gateway's daily quota tracker —
//! a lock-protected map that resets a window's counters the moment it
//! observes a timestamp past the window boundary — generalized from a
//! single daily window to the minute/hour/day/token windows
//! [`QuotaConfig`] describes.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;

use ca_domain::config::QuotaConfig;
use ca_domain::error::{Error, Result};
use ca_domain::ids::QuotaKind;
use ca_domain::trace::TraceEvent;

struct Window {
    minute_start: DateTime<Utc>,
    minute_count: u64,
    hour_start: DateTime<Utc>,
    hour_count: u64,
    day: NaiveDate,
    day_count: u64,
    day_tokens: u64,
}

impl Window {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            minute_start: now,
            minute_count: 0,
            hour_start: now,
            hour_count: 0,
            day: now.date_naive(),
            day_count: 0,
            day_tokens: 0,
        }
    }

    fn roll(&mut self, now: DateTime<Utc>) {
        if (now - self.minute_start).num_seconds() >= 60 {
            self.minute_start = now;
            self.minute_count = 0;
        }
        if (now - self.hour_start).num_seconds() >= 3600 {
            self.hour_start = now;
            self.hour_count = 0;
        }
        if now.date_naive() != self.day {
            self.day = now.date_naive();
            self.day_count = 0;
            self.day_tokens = 0;
        }
    }
}

struct Limits {
    requests_per_minute: u64,
    requests_per_hour: u64,
    requests_per_day: u64,
    tokens_per_day: u64,
}

/// In-memory fixed-window rate gate over [`QuotaConfig`].
pub struct RateGate {
    config: QuotaConfig,
    windows: RwLock<HashMap<String, Window>>,
}

impl RateGate {
    pub fn new(config: QuotaConfig) -> Self {
        Self { config, windows: RwLock::new(HashMap::new()) }
    }

    fn limits_for(&self, principal: &str) -> Limits {
        match self.config.overrides.get(principal) {
            Some(o) => Limits {
                requests_per_minute: o.requests_per_minute.unwrap_or(self.config.requests_per_minute),
                requests_per_hour: o.requests_per_hour.unwrap_or(self.config.requests_per_hour),
                requests_per_day: o.requests_per_day.unwrap_or(self.config.requests_per_day),
                tokens_per_day: o.tokens_per_day.unwrap_or(self.config.tokens_per_day),
            },
            None => Limits {
                requests_per_minute: self.config.requests_per_minute,
                requests_per_hour: self.config.requests_per_hour,
                requests_per_day: self.config.requests_per_day,
                tokens_per_day: self.config.tokens_per_day,
            },
        }
    }

    /// Verify `principal` is within every request window, then record
    /// one more request against all three. Checked and recorded under
    /// one write lock so concurrent callers can't both slip past a
    /// limit that only one of them should have cleared.
    pub fn check_and_record_request(&self, principal: &str, now: DateTime<Utc>) -> Result<()> {
        let result = self.check_and_record_request_locked(principal, now);
        if let Err(Error::QuotaExceeded { kind, used, limit }) = &result {
            TraceEvent::QuotaRejected { user_id: principal.to_string(), kind: kind.to_string(), used: *used, limit: *limit }.emit();
        }
        result
    }

    fn check_and_record_request_locked(&self, principal: &str, now: DateTime<Utc>) -> Result<()> {
        let limits = self.limits_for(principal);
        let mut windows = self.windows.write();
        let window = windows.entry(principal.to_string()).or_insert_with(|| Window::fresh(now));
        window.roll(now);

        if window.minute_count >= limits.requests_per_minute {
            return Err(Error::QuotaExceeded { kind: QuotaKind::RequestsPerMinute, used: window.minute_count, limit: limits.requests_per_minute });
        }
        if window.hour_count >= limits.requests_per_hour {
            return Err(Error::QuotaExceeded { kind: QuotaKind::RequestsPerHour, used: window.hour_count, limit: limits.requests_per_hour });
        }
        if window.day_count >= limits.requests_per_day {
            return Err(Error::QuotaExceeded { kind: QuotaKind::RequestsPerDay, used: window.day_count, limit: limits.requests_per_day });
        }
        if window.day_tokens >= limits.tokens_per_day {
            return Err(Error::QuotaExceeded { kind: QuotaKind::TokensPerDay, used: window.day_tokens, limit: limits.tokens_per_day });
        }

        window.minute_count += 1;
        window.hour_count += 1;
        window.day_count += 1;
        Ok(())
    }

    /// Record tokens actually consumed by a call, once its usage is
    /// known. Does not itself reject — a turn already admitted by
    /// [`Self::check_and_record_request`] is allowed to finish even if
    /// its token usage pushes the day over budget; the next request is
    /// what gets rejected.
    pub fn record_tokens(&self, principal: &str, tokens: u64, now: DateTime<Utc>) {
        let mut windows = self.windows.write();
        let window = windows.entry(principal.to_string()).or_insert_with(|| Window::fresh(now));
        window.roll(now);
        window.day_tokens += tokens;
    }
}
