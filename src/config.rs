use std::time::Duration;

use crate::model::Ms;

/// Engine tunables. Embedding services usually build this once from the
/// environment at startup and hand it to [`crate::Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// A booking must start at least this far in the future.
    pub min_lead_time_ms: Ms,
    /// Create one-on-one bookings directly Confirmed instead of Requested.
    pub auto_confirm: bool,
    /// How long a mutation waits for a trainer's calendar lock before
    /// reporting `Timeout`.
    pub lock_wait: Duration,
    /// Reject slot definitions whose coverage overlaps an existing slot of
    /// the same trainer. Off: overlapping slots are unioned.
    pub reject_overlapping_slots: bool,
    /// When set, a cancelled booking keeps blocking availability for this
    /// long after cancellation.
    pub cancelled_grace_ms: Option<Ms>,
    /// Journal appends since last compaction before the compactor rewrites
    /// the log.
    pub compact_threshold: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_lead_time_ms: 3_600_000, // 1 hour
            auto_confirm: false,
            lock_wait: Duration::from_secs(5),
            reject_overlapping_slots: false,
            cancelled_grace_ms: None,
            compact_threshold: 1000,
        }
    }
}

impl EngineConfig {
    /// Read overrides from `TRAINCAL_*` environment variables; anything
    /// unset or unparseable keeps its default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_lead_time_ms: env_parse("TRAINCAL_MIN_LEAD_TIME_MS")
                .unwrap_or(defaults.min_lead_time_ms),
            auto_confirm: env_parse("TRAINCAL_AUTO_CONFIRM").unwrap_or(defaults.auto_confirm),
            lock_wait: env_parse("TRAINCAL_LOCK_WAIT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_wait),
            reject_overlapping_slots: env_parse("TRAINCAL_REJECT_OVERLAPPING_SLOTS")
                .unwrap_or(defaults.reject_overlapping_slots),
            cancelled_grace_ms: env_parse("TRAINCAL_CANCELLED_GRACE_MS"),
            compact_threshold: env_parse("TRAINCAL_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
