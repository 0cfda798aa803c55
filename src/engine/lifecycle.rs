//! Booking lifecycle rules, separated from the coordinator so they stay
//! pure and table-testable.
//!
//! Requested → Confirmed → Completed
//! Requested | Confirmed → Cancelled
//! Confirmed → NoShow
//!
//! Cancelled, Completed and NoShow are terminal.

use crate::model::{Booking, BookingStatus, Ms};

use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Reschedule,
    Confirm,
    Cancel,
    Complete,
    NoShow,
    Enroll,
}

impl Action {
    pub(crate) fn verb(&self) -> &'static str {
        match self {
            Action::Reschedule => "reschedule",
            Action::Confirm => "confirm",
            Action::Cancel => "cancel",
            Action::Complete => "complete",
            Action::NoShow => "mark no-show for",
            Action::Enroll => "enroll into",
        }
    }
}

fn deny(from: BookingStatus, action: Action, reason: &'static str) -> Result<(), EngineError> {
    Err(EngineError::InvalidTransition {
        from,
        action: action.verb(),
        reason,
    })
}

/// Optimistic-concurrency guard. `None` skips the check (caller does not
/// care which version it is mutating).
pub(crate) fn ensure_version(booking: &Booking, expected: Option<u64>) -> Result<(), EngineError> {
    match expected {
        Some(v) if v != booking.version => Err(EngineError::StaleVersion {
            expected: v,
            actual: booking.version,
        }),
        _ => Ok(()),
    }
}

/// Check that `action` is admissible from the booking's current status.
/// `now` gates completion: a session can only be completed or no-showed
/// after its interval has elapsed.
pub(crate) fn ensure_transition(
    booking: &Booking,
    action: Action,
    now: Ms,
) -> Result<(), EngineError> {
    let from = booking.status;
    match action {
        Action::Reschedule | Action::Cancel | Action::Enroll => {
            if from.is_terminal() {
                return deny(from, action, "terminal status");
            }
            Ok(())
        }
        Action::Confirm => match from {
            BookingStatus::Requested => Ok(()),
            BookingStatus::Confirmed => deny(from, action, "already confirmed"),
            _ => deny(from, action, "terminal status"),
        },
        Action::Complete | Action::NoShow => {
            if from.is_terminal() {
                return deny(from, action, "terminal status");
            }
            if from != BookingStatus::Confirmed {
                return deny(from, action, "not confirmed");
            }
            if booking.interval.end > now {
                return deny(from, action, "session not yet elapsed");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookingKind, TimeRange};
    use ulid::Ulid;

    fn booking(status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            trainer_id: Ulid::new(),
            kind: BookingKind::OneOnOne {
                client_id: Ulid::new(),
            },
            interval: TimeRange::new(1000, 2000),
            status,
            notes: None,
            created_at: 0,
            updated_at: 0,
            cancelled_at: None,
            cancel_reason: None,
            version: 3,
        }
    }

    #[test]
    fn version_guard() {
        let b = booking(BookingStatus::Requested);
        assert!(ensure_version(&b, None).is_ok());
        assert!(ensure_version(&b, Some(3)).is_ok());
        assert!(matches!(
            ensure_version(&b, Some(2)),
            Err(EngineError::StaleVersion {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn cancel_from_active_only() {
        for status in [BookingStatus::Requested, BookingStatus::Confirmed] {
            assert!(ensure_transition(&booking(status), Action::Cancel, 0).is_ok());
        }
        for status in [
            BookingStatus::Cancelled,
            BookingStatus::Completed,
            BookingStatus::NoShow,
        ] {
            assert!(matches!(
                ensure_transition(&booking(status), Action::Cancel, 0),
                Err(EngineError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn confirm_only_from_requested() {
        assert!(ensure_transition(&booking(BookingStatus::Requested), Action::Confirm, 0).is_ok());
        assert!(matches!(
            ensure_transition(&booking(BookingStatus::Confirmed), Action::Confirm, 0),
            Err(EngineError::InvalidTransition {
                reason: "already confirmed",
                ..
            })
        ));
        assert!(matches!(
            ensure_transition(&booking(BookingStatus::Cancelled), Action::Confirm, 0),
            Err(EngineError::InvalidTransition {
                reason: "terminal status",
                ..
            })
        ));
    }

    #[test]
    fn complete_requires_confirmed_and_elapsed() {
        // Interval ends at 2000.
        let b = booking(BookingStatus::Confirmed);
        assert!(matches!(
            ensure_transition(&b, Action::Complete, 1500),
            Err(EngineError::InvalidTransition {
                reason: "session not yet elapsed",
                ..
            })
        ));
        assert!(ensure_transition(&b, Action::Complete, 2000).is_ok());
        assert!(ensure_transition(&b, Action::NoShow, 2500).is_ok());

        assert!(matches!(
            ensure_transition(&booking(BookingStatus::Requested), Action::Complete, 9999),
            Err(EngineError::InvalidTransition {
                reason: "not confirmed",
                ..
            })
        ));
    }

    #[test]
    fn reschedule_from_active_only() {
        assert!(ensure_transition(&booking(BookingStatus::Requested), Action::Reschedule, 0).is_ok());
        assert!(ensure_transition(&booking(BookingStatus::Confirmed), Action::Reschedule, 0).is_ok());
        assert!(matches!(
            ensure_transition(&booking(BookingStatus::Completed), Action::Reschedule, 0),
            Err(EngineError::InvalidTransition { .. })
        ));
    }
}
