use crate::config::EngineConfig;
use crate::limits::*;
use crate::model::*;

use super::EngineError;
use super::availability::{free_ranges, subtract_ranges};

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_range(range: &TimeRange) -> Result<(), EngineError> {
    if range.start >= range.end {
        return Err(EngineError::InvalidInterval("start must be before end"));
    }
    if range.start < MIN_VALID_TIMESTAMP_MS || range.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::InvalidInterval("timestamp out of range"));
    }
    if range.duration_ms() > MAX_SESSION_DURATION_MS {
        return Err(EngineError::InvalidInterval("session longer than a day"));
    }
    Ok(())
}

/// Validate a candidate interval against a trainer's calendar.
///
/// Reasons are collected in strict order — lead-time cutoff, coverage,
/// per-booking overlaps — so the first entry is the primary reason while the
/// caller still sees everything that is wrong. `exclude` is threaded through
/// both the free-range computation and the overlap scan; a reschedule never
/// conflicts with the booking being moved.
pub(crate) fn check(
    state: &CalendarState,
    candidate: &TimeRange,
    now: Ms,
    config: &EngineConfig,
    exclude: Option<BookingId>,
) -> ConflictReport {
    let mut reasons = Vec::new();

    let earliest_start = now + config.min_lead_time_ms;
    if candidate.start < earliest_start {
        reasons.push(ConflictReason::PastCutoff { earliest_start });
    }

    let free = free_ranges(state, candidate, now, exclude, config.cancelled_grace_ms);
    let uncovered = subtract_ranges(&[*candidate], &free);
    if !uncovered.is_empty() {
        reasons.push(ConflictReason::OutsideAvailability { uncovered });
    }

    for booking in state.active_overlapping(candidate) {
        if exclude == Some(booking.id) {
            continue;
        }
        reasons.push(ConflictReason::Overlap {
            booking_id: booking.id,
        });
    }

    ConflictReport::from_reasons(reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const H: Ms = 3_600_000;
    const M: Ms = 60_000;
    const D: Ms = 86_400_000;

    fn cfg_with_lead(lead: Ms) -> EngineConfig {
        EngineConfig {
            min_lead_time_ms: lead,
            ..EngineConfig::default()
        }
    }

    fn calendar_with_slot(start: Ms, end: Ms) -> CalendarState {
        let trainer = Ulid::new();
        let mut cs = CalendarState::new(trainer);
        cs.insert_slot(AvailabilitySlot {
            id: Ulid::new(),
            trainer_id: trainer,
            window: TimeRange::new(start, end),
            recurrence: Recurrence::OneOff,
            valid_from: start,
            valid_until: None,
        });
        cs
    }

    fn confirmed(cs: &mut CalendarState, start: Ms, end: Ms) -> BookingId {
        let b = Booking {
            id: Ulid::new(),
            trainer_id: cs.trainer_id,
            kind: BookingKind::OneOnOne {
                client_id: Ulid::new(),
            },
            interval: TimeRange::new(start, end),
            status: BookingStatus::Confirmed,
            notes: None,
            created_at: 0,
            updated_at: 0,
            cancelled_at: None,
            cancel_reason: None,
            version: 0,
        };
        let id = b.id;
        cs.insert_booking(b);
        id
    }

    #[test]
    fn valid_candidate_is_clear() {
        let cs = calendar_with_slot(D + 9 * H, D + 12 * H);
        let report = check(&cs, &TimeRange::new(D + 9 * H, D + 10 * H), 0, &cfg_with_lead(H), None);
        assert!(!report.conflicting);
        assert!(report.reasons.is_empty());
    }

    #[test]
    fn cutoff_violation_reported_first() {
        // Candidate starts 30 minutes out, lead time is 60 minutes; candidate
        // also sits outside any slot, so two reasons come back.
        let cs = CalendarState::new(Ulid::new());
        let now = D;
        let candidate = TimeRange::new(now + 30 * M, now + 90 * M);
        let report = check(&cs, &candidate, now, &cfg_with_lead(60 * M), None);
        assert!(report.conflicting);
        assert!(matches!(
            report.reasons[0],
            ConflictReason::PastCutoff { earliest_start } if earliest_start == now + 60 * M
        ));
    }

    #[test]
    fn outside_availability_carries_uncovered() {
        let cs = calendar_with_slot(D + 9 * H, D + 12 * H);
        // 11:00–13:00 hangs one hour past the slot.
        let report = check(&cs, &TimeRange::new(D + 11 * H, D + 13 * H), 0, &cfg_with_lead(0), None);
        assert!(report.conflicting);
        assert_eq!(
            report.reasons,
            vec![ConflictReason::OutsideAvailability {
                uncovered: vec![TimeRange::new(D + 12 * H, D + 13 * H)],
            }]
        );
    }

    #[test]
    fn overlap_references_the_existing_booking() {
        let mut cs = calendar_with_slot(D + 9 * H, D + 12 * H);
        let existing = confirmed(&mut cs, D + 9 * H, D + 10 * H);

        let report = check(
            &cs,
            &TimeRange::new(D + 9 * H + 30 * M, D + 10 * H + 30 * M),
            0,
            &cfg_with_lead(0),
            None,
        );
        assert!(report.conflicting);
        // Booked time is no longer free, and the specific booking is named.
        assert!(report.reasons.iter().any(|r| matches!(
            r,
            ConflictReason::Overlap { booking_id } if *booking_id == existing
        )));
        assert!(report
            .reasons
            .iter()
            .any(|r| matches!(r, ConflictReason::OutsideAvailability { .. })));
    }

    #[test]
    fn back_to_back_is_clear() {
        let mut cs = calendar_with_slot(D + 9 * H, D + 12 * H);
        confirmed(&mut cs, D + 9 * H, D + 10 * H);
        let report = check(&cs, &TimeRange::new(D + 10 * H, D + 11 * H), 0, &cfg_with_lead(0), None);
        assert!(!report.conflicting);
    }

    #[test]
    fn excluded_booking_never_conflicts_with_itself() {
        let mut cs = calendar_with_slot(D + 9 * H, D + 12 * H);
        let own = confirmed(&mut cs, D + 9 * H, D + 10 * H);

        // Nudge 30 minutes later, overlapping the original position.
        let candidate = TimeRange::new(D + 9 * H + 30 * M, D + 10 * H + 30 * M);
        let report = check(&cs, &candidate, 0, &cfg_with_lead(0), Some(own));
        assert!(!report.conflicting);
    }

    #[test]
    fn validate_range_rejects_malformed() {
        assert!(matches!(
            validate_range(&TimeRange { start: 200, end: 100 }),
            Err(EngineError::InvalidInterval("start must be before end"))
        ));
        assert!(matches!(
            validate_range(&TimeRange { start: -5, end: 100 }),
            Err(EngineError::InvalidInterval("timestamp out of range"))
        ));
        assert!(matches!(
            validate_range(&TimeRange::new(0, 2 * D)),
            Err(EngineError::InvalidInterval("session longer than a day"))
        ));
        assert!(validate_range(&TimeRange::new(D, D + H)).is_ok());
    }
}
