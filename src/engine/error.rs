use ulid::Ulid;

use crate::model::{BookingStatus, ConflictReport};

#[derive(Debug)]
pub enum EngineError {
    /// Malformed time range: start >= end, timestamp outside the valid
    /// window, or duration beyond the session limit.
    InvalidInterval(&'static str),
    /// Business-rule rejection; carries every reason found.
    Conflict(ConflictReport),
    /// The booking's current status does not admit the requested action.
    InvalidTransition {
        from: BookingStatus,
        action: &'static str,
        reason: &'static str,
    },
    /// Optimistic-concurrency collision; caller may retry with fresh data.
    StaleVersion { expected: u64, actual: u64 },
    /// Lock-wait deadline exceeded; nothing was applied.
    Timeout,
    NotFound(Ulid),
    /// New slot definition overlaps an existing slot (only when the engine
    /// is configured to reject overlapping slots).
    SlotOverlaps(Ulid),
    /// Enrollment target is a one-on-one booking.
    NotGroupSession(Ulid),
    AlreadyEnrolled(Ulid),
    LimitExceeded(&'static str),
    /// Infrastructure fault in the journal, already retried.
    Journal(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval(msg) => write!(f, "invalid interval: {msg}"),
            EngineError::Conflict(report) => {
                write!(f, "booking conflict ({} reasons)", report.reasons.len())
            }
            EngineError::InvalidTransition {
                from,
                action,
                reason,
            } => {
                write!(f, "cannot {action} booking in status {from}: {reason}")
            }
            EngineError::StaleVersion { expected, actual } => {
                write!(f, "stale version: expected {expected}, actual {actual}")
            }
            EngineError::Timeout => write!(f, "timed out waiting for calendar lock"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::SlotOverlaps(id) => {
                write!(f, "slot overlaps existing slot {id}")
            }
            EngineError::NotGroupSession(id) => {
                write!(f, "booking {id} is not a group session")
            }
            EngineError::AlreadyEnrolled(client_id) => {
                write!(f, "client {client_id} already enrolled")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Journal(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
