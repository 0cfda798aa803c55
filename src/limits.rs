//! Hard limits. These protect the engine from unbounded input, not from
//! legitimate traffic — a deployment that hits one of these has a bug or an
//! abuser upstream.

use crate::model::Ms;

/// Earliest timestamp the engine accepts (unix epoch).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// Latest timestamp the engine accepts (2100-01-01T00:00:00Z).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single session longer than a day is malformed input.
pub const MAX_SESSION_DURATION_MS: Ms = 86_400_000;

/// Availability queries are clamped to ~90 days.
pub const MAX_QUERY_WINDOW_MS: Ms = 7_776_000_000;

pub const MAX_SLOTS_PER_TRAINER: usize = 256;

/// Bookings are never physically deleted, so this bounds a calendar's
/// lifetime history, not its live schedule.
pub const MAX_BOOKINGS_PER_TRAINER: usize = 50_000;

pub const MAX_NOTE_LEN: usize = 1_024;
pub const MAX_CANCEL_REASON_LEN: usize = 1_024;
pub const MAX_SESSION_NAME_LEN: usize = 255;
pub const MAX_GROUP_CAPACITY: u32 = 500;

pub const MAX_PAGE_LIMIT: usize = 100;

/// Journal appends are retried this many times before the fault is surfaced.
/// Kept small so a trainer's calendar lock is never held across a long outage.
pub const JOURNAL_RETRY_LIMIT: u32 = 2;
pub const JOURNAL_RETRY_BACKOFF_MS: u64 = 50;
