use crate::model::*;

pub const WEEK_MS: Ms = 604_800_000;

// ── Availability Algorithm ────────────────────────────────────────

/// Expand one slot into its concrete occurrences overlapping `query`,
/// clamped to the query window.
///
/// Weekly slots project the anchor window forward in whole-week steps; the
/// walk starts at the first occurrence that can reach `query.start` and
/// stops at `query.end` (or `valid_until`), so open-ended slots never
/// expand unboundedly. Pure integer arithmetic — same inputs, same output.
pub fn expand_slot(slot: &AvailabilitySlot, query: &TimeRange) -> Vec<TimeRange> {
    match slot.recurrence {
        Recurrence::OneOff => {
            if slot.window.overlaps(query) && occurrence_active(slot, slot.window.start) {
                vec![slot.window.clamp_to(query)]
            } else {
                Vec::new()
            }
        }
        Recurrence::Weekly => {
            let mut out = Vec::new();
            // Smallest k with window.end + k*WEEK > query.start.
            let k_min = (query.start - slot.window.end).div_euclid(WEEK_MS) + 1;
            let mut k = k_min.max(0);
            loop {
                let occ = slot.window.shifted(k * WEEK_MS);
                if occ.start >= query.end {
                    break;
                }
                if let Some(until) = slot.valid_until
                    && occ.start >= until {
                        break;
                    }
                if occ.start >= slot.valid_from {
                    out.push(occ.clamp_to(query));
                }
                k += 1;
            }
            out
        }
    }
}

fn occurrence_active(slot: &AvailabilitySlot, start: Ms) -> bool {
    start >= slot.valid_from && slot.valid_until.is_none_or(|until| start < until)
}

/// Union of all slot coverage within `query`, as disjoint sorted ranges.
/// Overlapping slot definitions union; coverage never depends on the order
/// slots were declared in.
pub fn coverage(slots: &[AvailabilitySlot], query: &TimeRange) -> Vec<TimeRange> {
    let mut cover: Vec<TimeRange> = Vec::new();
    for slot in slots {
        cover.extend(expand_slot(slot, query));
    }
    cover.sort_by_key(|r| r.start);
    merge_ranges(&cover)
}

/// Free sub-ranges of `query`: slot coverage minus committed bookings.
///
/// Active (Requested/Confirmed) bookings always block. A cancelled booking
/// blocks while inside the configured grace period. `exclude` drops one
/// booking from consideration so a reschedule never collides with itself.
pub fn free_ranges(
    state: &CalendarState,
    query: &TimeRange,
    now: Ms,
    exclude: Option<BookingId>,
    cancelled_grace_ms: Option<Ms>,
) -> Vec<TimeRange> {
    let free = coverage(&state.slots, query);
    if free.is_empty() {
        return free;
    }

    let mut busy: Vec<TimeRange> = Vec::new();
    for booking in state.overlapping(query) {
        if exclude == Some(booking.id) {
            continue;
        }
        let blocks = booking.status.is_active()
            || (booking.status == BookingStatus::Cancelled
                && cancelled_grace_ms
                    .zip(booking.cancelled_at)
                    .is_some_and(|(grace, at)| now < at + grace));
        if blocks {
            busy.push(booking.interval.clamp_to(query));
        }
    }
    if busy.is_empty() {
        return free;
    }
    busy.sort_by_key(|r| r.start);
    subtract_ranges(&free, &busy)
}

/// Merge sorted overlapping/adjacent ranges into disjoint ranges.
pub fn merge_ranges(sorted: &[TimeRange]) -> Vec<TimeRange> {
    let mut merged: Vec<TimeRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && range.start <= last.end {
                last.end = last.end.max(range.end);
                continue;
            }
        merged.push(range);
    }
    merged
}

/// `base` minus the union of `cutouts`. Both inputs sorted by start; base
/// ranges disjoint, cutouts may overlap each other.
pub fn subtract_ranges(base: &[TimeRange], cutouts: &[TimeRange]) -> Vec<TimeRange> {
    let mut out = Vec::new();
    let mut ci = 0;

    for &b in base {
        let mut cursor = b.start;

        while ci < cutouts.len() && cutouts[ci].end <= cursor {
            ci += 1;
        }

        let mut j = ci;
        while j < cutouts.len() && cutouts[j].start < b.end {
            let c = cutouts[j];
            if c.start > cursor {
                out.push(TimeRange::new(cursor, c.start));
            }
            cursor = cursor.max(c.end);
            j += 1;
        }

        if cursor < b.end {
            out.push(TimeRange::new(cursor, b.end));
        }
    }

    out
}

/// Whether two slot definitions can cover a common instant. Backs the
/// reject-overlapping-slots option.
///
/// Weekly-vs-weekly compares phases within the week: two weekly slots with
/// intersecting validity count as overlapping when their weekly phases
/// collide, even if their validity windows never share a concrete week.
/// Conservative on purpose — the check gates slot *definitions*, not
/// bookings.
pub fn slots_overlap(a: &AvailabilitySlot, b: &AvailabilitySlot) -> bool {
    if !validity_intersects(a, b) {
        return false;
    }
    match (a.recurrence, b.recurrence) {
        (Recurrence::OneOff, Recurrence::OneOff) => a.window.overlaps(&b.window),
        (Recurrence::Weekly, Recurrence::OneOff) => !expand_slot(a, &b.window).is_empty(),
        (Recurrence::OneOff, Recurrence::Weekly) => !expand_slot(b, &a.window).is_empty(),
        (Recurrence::Weekly, Recurrence::Weekly) => phases_collide(&a.window, &b.window),
    }
}

fn validity_intersects(a: &AvailabilitySlot, b: &AvailabilitySlot) -> bool {
    let a_end = a.valid_until.unwrap_or(Ms::MAX);
    let b_end = b.valid_until.unwrap_or(Ms::MAX);
    a.valid_from < b_end && b.valid_from < a_end
}

fn phases_collide(a: &TimeRange, b: &TimeRange) -> bool {
    let pa = a.start.rem_euclid(WEEK_MS);
    let pb = b.start.rem_euclid(WEEK_MS);
    // Unroll onto a line around b's phase to handle week wraparound.
    for shift in [-WEEK_MS, 0, WEEK_MS] {
        let sa = pa + shift;
        if sa < pb + b.duration_ms() && pb < sa + a.duration_ms() {
            return true;
        }
    }
    false
}
