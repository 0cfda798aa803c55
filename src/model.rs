use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub type TrainerId = Ulid;
pub type ClientId = Ulid;
pub type BookingId = Ulid;
pub type SlotId = Ulid;

/// Half-open time range `[start, end)`. Comparisons are exact; nothing is
/// rounded to a coarser granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Ms,
    pub end: Ms,
}

impl TimeRange {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True iff `other` lies fully within `self`.
    pub fn covers(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection with `bounds`. Caller must ensure the ranges overlap.
    pub fn clamp_to(&self, bounds: &TimeRange) -> TimeRange {
        TimeRange::new(self.start.max(bounds.start), self.end.min(bounds.end))
    }

    pub fn shifted(&self, delta: Ms) -> TimeRange {
        TimeRange::new(self.start + delta, self.end + delta)
    }
}

/// How an availability slot repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recurrence {
    OneOff,
    Weekly,
}

/// A declared bookable window on a trainer's calendar. `window` is the first
/// concrete occurrence; weekly slots project it forward in whole-week steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: SlotId,
    pub trainer_id: TrainerId,
    pub window: TimeRange,
    pub recurrence: Recurrence,
    /// Occurrences starting before this instant are inactive.
    pub valid_from: Ms,
    /// Occurrences starting at or after this instant are inactive.
    /// `None` = open-ended; expansion is still bounded by the query window.
    pub valid_until: Option<Ms>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Requested,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    /// Active bookings occupy the calendar and participate in conflict
    /// detection.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Requested | BookingStatus::Confirmed)
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Completed | BookingStatus::NoShow
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BookingStatus::Requested => "requested",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::NoShow => "no_show",
        };
        f.write_str(s)
    }
}

/// The two session shapes: a one-on-one booking owned by a single client, or
/// a group class clients enroll into up to capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingKind {
    OneOnOne {
        client_id: ClientId,
    },
    Group {
        name: String,
        max_participants: u32,
        enrolled: Vec<ClientId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub trainer_id: TrainerId,
    pub kind: BookingKind,
    pub interval: TimeRange,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
    pub cancelled_at: Option<Ms>,
    pub cancel_reason: Option<String>,
    /// Bumped on every committed transition; optimistic concurrency token.
    pub version: u64,
}

/// A trainer's calendar: slots plus full booking history. Bookings are never
/// removed — cancellation and completion are status changes.
#[derive(Debug, Clone)]
pub struct CalendarState {
    pub trainer_id: TrainerId,
    pub slots: Vec<AvailabilitySlot>,
    /// Sorted by `interval.start`.
    pub bookings: Vec<Booking>,
}

impl CalendarState {
    pub fn new(trainer_id: TrainerId) -> Self {
        Self {
            trainer_id,
            slots: Vec::new(),
            bookings: Vec::new(),
        }
    }

    pub fn insert_slot(&mut self, slot: AvailabilitySlot) {
        self.slots.push(slot);
    }

    pub fn remove_slot(&mut self, id: SlotId) -> Option<AvailabilitySlot> {
        let pos = self.slots.iter().position(|s| s.id == id)?;
        Some(self.slots.remove(pos))
    }

    pub fn slot(&self, id: SlotId) -> Option<&AvailabilitySlot> {
        self.slots.iter().find(|s| s.id == id)
    }

    /// Insert maintaining sort order by interval.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.interval.start, |b| b.interval.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Take a booking out of the sorted vec (reschedule re-inserts it at the
    /// new position).
    pub fn take_booking(&mut self, id: BookingId) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose interval overlaps the query window, regardless of
    /// status. Binary search skips everything starting at or after query.end.
    pub fn overlapping(&self, query: &TimeRange) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.interval.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.interval.end > query.start)
    }

    /// Requested/Confirmed bookings overlapping the query window.
    pub fn active_overlapping(&self, query: &TimeRange) -> impl Iterator<Item = &Booking> {
        self.overlapping(query).filter(|b| b.status.is_active())
    }
}

/// Journal record format. Transition events carry the commit timestamp; the
/// version bump is applied deterministically on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalendarEvent {
    SlotAdded {
        slot: AvailabilitySlot,
    },
    SlotRemoved {
        id: SlotId,
        trainer_id: TrainerId,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingRescheduled {
        id: BookingId,
        trainer_id: TrainerId,
        interval: TimeRange,
        at: Ms,
    },
    BookingConfirmed {
        id: BookingId,
        trainer_id: TrainerId,
        at: Ms,
    },
    BookingCancelled {
        id: BookingId,
        trainer_id: TrainerId,
        at: Ms,
        reason: Option<String>,
    },
    BookingCompleted {
        id: BookingId,
        trainer_id: TrainerId,
        at: Ms,
    },
    BookingNoShow {
        id: BookingId,
        trainer_id: TrainerId,
        at: Ms,
    },
    ClientEnrolled {
        id: BookingId,
        trainer_id: TrainerId,
        client_id: ClientId,
        at: Ms,
    },
}

impl CalendarEvent {
    pub fn trainer_id(&self) -> TrainerId {
        match self {
            CalendarEvent::SlotAdded { slot } => slot.trainer_id,
            CalendarEvent::BookingCreated { booking } => booking.trainer_id,
            CalendarEvent::SlotRemoved { trainer_id, .. }
            | CalendarEvent::BookingRescheduled { trainer_id, .. }
            | CalendarEvent::BookingConfirmed { trainer_id, .. }
            | CalendarEvent::BookingCancelled { trainer_id, .. }
            | CalendarEvent::BookingCompleted { trainer_id, .. }
            | CalendarEvent::BookingNoShow { trainer_id, .. }
            | CalendarEvent::ClientEnrolled { trainer_id, .. } => *trainer_id,
        }
    }
}

// ── Conflict reporting ───────────────────────────────────────────

/// One reason a candidate interval cannot commit. Serializable so the API
/// layer can pass the verdict through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictReason {
    /// Candidate starts before now + minimum lead time.
    PastCutoff { earliest_start: Ms },
    /// Candidate is not fully covered by the trainer's free ranges; carries
    /// the sub-ranges that are not covered.
    OutsideAvailability { uncovered: Vec<TimeRange> },
    /// Candidate overlaps an active booking.
    Overlap { booking_id: BookingId },
}

/// Per-validation verdict. Ephemeral — produced per check, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflicting: bool,
    /// Ordered: cutoff first, then coverage, then overlaps. The first entry
    /// is the primary reason.
    pub reasons: Vec<ConflictReason>,
}

impl ConflictReport {
    pub fn clear() -> Self {
        Self {
            conflicting: false,
            reasons: Vec::new(),
        }
    }

    pub fn from_reasons(reasons: Vec<ConflictReason>) -> Self {
        Self {
            conflicting: !reasons.is_empty(),
            reasons,
        }
    }
}

/// One page of a booking listing, newest session first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingPage {
    pub bookings: Vec<Booking>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_on_one(start: Ms, end: Ms, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            trainer_id: Ulid::new(),
            kind: BookingKind::OneOnOne {
                client_id: Ulid::new(),
            },
            interval: TimeRange::new(start, end),
            status,
            notes: None,
            created_at: 0,
            updated_at: 0,
            cancelled_at: None,
            cancel_reason: None,
            version: 0,
        }
    }

    #[test]
    fn range_basics() {
        let r = TimeRange::new(100, 200);
        assert_eq!(r.duration_ms(), 100);
        assert_eq!(r.shifted(50), TimeRange::new(150, 250));
    }

    #[test]
    fn range_overlap_half_open() {
        let a = TimeRange::new(100, 200);
        let b = TimeRange::new(150, 250);
        let c = TimeRange::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // back-to-back, not overlapping
    }

    #[test]
    fn range_covers() {
        let outer = TimeRange::new(100, 400);
        assert!(outer.covers(&TimeRange::new(150, 300)));
        assert!(outer.covers(&outer));
        assert!(!outer.covers(&TimeRange::new(50, 200)));
        assert!(!outer.covers(&TimeRange::new(300, 500)));
    }

    #[test]
    fn status_classification() {
        assert!(BookingStatus::Requested.is_active());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::NoShow.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
    }

    #[test]
    fn bookings_kept_sorted() {
        let mut cs = CalendarState::new(Ulid::new());
        cs.insert_booking(one_on_one(300, 400, BookingStatus::Confirmed));
        cs.insert_booking(one_on_one(100, 200, BookingStatus::Confirmed));
        cs.insert_booking(one_on_one(200, 300, BookingStatus::Confirmed));
        let starts: Vec<Ms> = cs.bookings.iter().map(|b| b.interval.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn overlapping_prunes_and_filters() {
        let mut cs = CalendarState::new(Ulid::new());
        cs.insert_booking(one_on_one(100, 200, BookingStatus::Confirmed));
        cs.insert_booking(one_on_one(450, 600, BookingStatus::Confirmed));
        cs.insert_booking(one_on_one(1000, 1100, BookingStatus::Confirmed));

        let hits: Vec<_> = cs.overlapping(&TimeRange::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].interval, TimeRange::new(450, 600));
    }

    #[test]
    fn active_overlapping_skips_history() {
        let mut cs = CalendarState::new(Ulid::new());
        cs.insert_booking(one_on_one(100, 200, BookingStatus::Cancelled));
        cs.insert_booking(one_on_one(150, 250, BookingStatus::Completed));
        cs.insert_booking(one_on_one(180, 280, BookingStatus::Requested));

        let hits: Vec<_> = cs.active_overlapping(&TimeRange::new(0, 1000)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].status, BookingStatus::Requested);
    }

    #[test]
    fn back_to_back_not_overlapping() {
        let mut cs = CalendarState::new(Ulid::new());
        cs.insert_booking(one_on_one(100, 200, BookingStatus::Confirmed));
        let hits: Vec<_> = cs.overlapping(&TimeRange::new(200, 300)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn take_booking_preserves_order() {
        let mut cs = CalendarState::new(Ulid::new());
        let a = one_on_one(100, 200, BookingStatus::Confirmed);
        let b = one_on_one(200, 300, BookingStatus::Confirmed);
        let c = one_on_one(300, 400, BookingStatus::Confirmed);
        let b_id = b.id;
        cs.insert_booking(a.clone());
        cs.insert_booking(b);
        cs.insert_booking(c.clone());

        let taken = cs.take_booking(b_id).unwrap();
        assert_eq!(taken.id, b_id);
        assert_eq!(cs.bookings.len(), 2);
        assert_eq!(cs.bookings[0].id, a.id);
        assert_eq!(cs.bookings[1].id, c.id);
        assert!(cs.take_booking(b_id).is_none());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = CalendarEvent::BookingCreated {
            booking: one_on_one(1000, 2000, BookingStatus::Requested),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: CalendarEvent = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn event_trainer_id_extraction() {
        let booking = one_on_one(0, 100, BookingStatus::Requested);
        let tid = booking.trainer_id;
        let event = CalendarEvent::BookingCreated { booking };
        assert_eq!(event.trainer_id(), tid);

        let event = CalendarEvent::BookingCancelled {
            id: Ulid::new(),
            trainer_id: tid,
            at: 5,
            reason: None,
        };
        assert_eq!(event.trainer_id(), tid);
    }

    #[test]
    fn conflict_report_flags() {
        assert!(!ConflictReport::clear().conflicting);
        let report = ConflictReport::from_reasons(vec![ConflictReason::PastCutoff {
            earliest_start: 100,
        }]);
        assert!(report.conflicting);
        assert_eq!(report.reasons.len(), 1);
    }
}
