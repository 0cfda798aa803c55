use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{WEEK_MS, slots_overlap};
use super::conflict::{check, now_ms, validate_range};
use super::lifecycle::{Action, ensure_transition, ensure_version};
use super::{Engine, EngineError};

impl Engine {
    // ── Slot management ──────────────────────────────────────────

    pub async fn add_slot(
        &self,
        trainer_id: TrainerId,
        window: TimeRange,
        recurrence: Recurrence,
        valid_until: Option<Ms>,
    ) -> Result<AvailabilitySlot, EngineError> {
        if window.start >= window.end {
            return Err(EngineError::InvalidInterval("start must be before end"));
        }
        if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
            return Err(EngineError::InvalidInterval("timestamp out of range"));
        }
        if recurrence == Recurrence::Weekly && window.duration_ms() >= WEEK_MS {
            return Err(EngineError::InvalidInterval("weekly window spans a full week"));
        }
        if let Some(until) = valid_until
            && until <= window.start {
                return Err(EngineError::InvalidInterval("validity ends before first occurrence"));
            }

        let cal = self.calendar_entry(trainer_id);
        let mut guard = self.lock_calendar(&cal).await?;
        if guard.slots.len() >= MAX_SLOTS_PER_TRAINER {
            return Err(EngineError::LimitExceeded("too many slots for trainer"));
        }

        let slot = AvailabilitySlot {
            id: Ulid::new(),
            trainer_id,
            window,
            recurrence,
            valid_from: window.start,
            valid_until,
        };

        if self.config.reject_overlapping_slots
            && let Some(existing) = guard.slots.iter().find(|s| slots_overlap(s, &slot)) {
                return Err(EngineError::SlotOverlaps(existing.id));
            }

        let event = CalendarEvent::SlotAdded { slot: slot.clone() };
        self.persist_and_apply(trainer_id, &mut guard, &event).await?;
        Ok(slot)
    }

    pub async fn remove_slot(&self, slot_id: SlotId) -> Result<(), EngineError> {
        let trainer_id = self
            .trainer_for(&slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        let cal = self
            .get_calendar(&trainer_id)
            .ok_or(EngineError::NotFound(trainer_id))?;
        let mut guard = self.lock_calendar(&cal).await?;
        if guard.slot(slot_id).is_none() {
            return Err(EngineError::NotFound(slot_id));
        }

        let event = CalendarEvent::SlotRemoved {
            id: slot_id,
            trainer_id,
        };
        self.persist_and_apply(trainer_id, &mut guard, &event).await
    }

    // ── Booking creation ─────────────────────────────────────────

    /// Book a one-on-one session. The interval must pass conflict detection
    /// under the trainer's exclusive scope; detection and commit are one
    /// atomic step, so two racing requests can never both land.
    pub async fn create_booking(
        &self,
        trainer_id: TrainerId,
        client_id: ClientId,
        interval: TimeRange,
        notes: Option<String>,
    ) -> Result<Booking, EngineError> {
        validate_range(&interval)?;
        if let Some(ref n) = notes
            && n.len() > MAX_NOTE_LEN {
                return Err(EngineError::LimitExceeded("notes too long"));
            }

        let status = if self.config.auto_confirm {
            BookingStatus::Confirmed
        } else {
            BookingStatus::Requested
        };
        self.commit_new_booking(
            trainer_id,
            BookingKind::OneOnOne { client_id },
            interval,
            status,
            notes,
        )
        .await
    }

    /// Create a group class on the trainer's calendar. Group sessions occupy
    /// the calendar exactly like one-on-one bookings and go through the same
    /// conflict detection; clients then enroll up to capacity.
    pub async fn create_group_session(
        &self,
        trainer_id: TrainerId,
        name: String,
        max_participants: u32,
        interval: TimeRange,
    ) -> Result<Booking, EngineError> {
        validate_range(&interval)?;
        if name.len() > MAX_SESSION_NAME_LEN {
            return Err(EngineError::LimitExceeded("session name too long"));
        }
        if max_participants == 0 {
            return Err(EngineError::LimitExceeded("group capacity must be positive"));
        }
        if max_participants > MAX_GROUP_CAPACITY {
            return Err(EngineError::LimitExceeded("group capacity too large"));
        }

        self.commit_new_booking(
            trainer_id,
            BookingKind::Group {
                name,
                max_participants,
                enrolled: Vec::new(),
            },
            interval,
            BookingStatus::Confirmed,
            None,
        )
        .await
    }

    async fn commit_new_booking(
        &self,
        trainer_id: TrainerId,
        kind: BookingKind,
        interval: TimeRange,
        status: BookingStatus,
        notes: Option<String>,
    ) -> Result<Booking, EngineError> {
        let cal = self.calendar_entry(trainer_id);
        let mut guard = self.lock_calendar(&cal).await?;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_TRAINER {
            return Err(EngineError::LimitExceeded("too many bookings for trainer"));
        }

        let now = now_ms();
        let report = check(&guard, &interval, now, &self.config, None);
        if report.conflicting {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            tracing::debug!(%trainer_id, reasons = report.reasons.len(), "booking rejected");
            return Err(EngineError::Conflict(report));
        }

        let booking = Booking {
            id: Ulid::new(),
            trainer_id,
            kind,
            interval,
            status,
            notes,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            cancel_reason: None,
            version: 0,
        };
        let event = CalendarEvent::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(trainer_id, &mut guard, &event).await?;
        Ok(booking)
    }

    // ── Booking transitions ──────────────────────────────────────

    /// Move a booking to a new interval. Conflict detection re-runs with the
    /// booking's own id excluded, so it never collides with itself.
    pub async fn reschedule_booking(
        &self,
        booking_id: BookingId,
        new_interval: TimeRange,
        expected_version: Option<u64>,
    ) -> Result<Booking, EngineError> {
        validate_range(&new_interval)?;
        let (trainer_id, mut guard) = self.resolve_booking_write(booking_id).await?;
        let now = now_ms();

        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        ensure_version(booking, expected_version)?;
        ensure_transition(booking, Action::Reschedule, now)?;

        let report = check(&guard, &new_interval, now, &self.config, Some(booking_id));
        if report.conflicting {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            tracing::debug!(%trainer_id, %booking_id, "reschedule rejected");
            return Err(EngineError::Conflict(report));
        }

        let event = CalendarEvent::BookingRescheduled {
            id: booking_id,
            trainer_id,
            interval: new_interval,
            at: now,
        };
        self.persist_and_apply(trainer_id, &mut guard, &event).await?;
        guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    pub async fn confirm_booking(
        &self,
        booking_id: BookingId,
        expected_version: Option<u64>,
    ) -> Result<Booking, EngineError> {
        self.transition(booking_id, expected_version, Action::Confirm, |trainer_id, at| {
            CalendarEvent::BookingConfirmed {
                id: booking_id,
                trainer_id,
                at,
            }
        })
        .await
    }

    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        reason: Option<String>,
        expected_version: Option<u64>,
    ) -> Result<Booking, EngineError> {
        if let Some(ref r) = reason
            && r.len() > MAX_CANCEL_REASON_LEN {
                return Err(EngineError::LimitExceeded("cancel reason too long"));
            }
        self.transition(booking_id, expected_version, Action::Cancel, |trainer_id, at| {
            CalendarEvent::BookingCancelled {
                id: booking_id,
                trainer_id,
                at,
                reason,
            }
        })
        .await
    }

    pub async fn complete_booking(
        &self,
        booking_id: BookingId,
        expected_version: Option<u64>,
    ) -> Result<Booking, EngineError> {
        self.transition(booking_id, expected_version, Action::Complete, |trainer_id, at| {
            CalendarEvent::BookingCompleted {
                id: booking_id,
                trainer_id,
                at,
            }
        })
        .await
    }

    pub async fn mark_no_show(
        &self,
        booking_id: BookingId,
        expected_version: Option<u64>,
    ) -> Result<Booking, EngineError> {
        self.transition(booking_id, expected_version, Action::NoShow, |trainer_id, at| {
            CalendarEvent::BookingNoShow {
                id: booking_id,
                trainer_id,
                at,
            }
        })
        .await
    }

    /// Enroll a client into a group session, guarded by the same per-trainer
    /// scope as every other mutation so capacity checks cannot race.
    pub async fn enroll_client(
        &self,
        session_id: BookingId,
        client_id: ClientId,
        expected_version: Option<u64>,
    ) -> Result<Booking, EngineError> {
        let (trainer_id, mut guard) = self.resolve_booking_write(session_id).await?;
        let now = now_ms();

        let booking = guard
            .booking(session_id)
            .ok_or(EngineError::NotFound(session_id))?;
        ensure_version(booking, expected_version)?;
        ensure_transition(booking, Action::Enroll, now)?;
        match &booking.kind {
            BookingKind::OneOnOne { .. } => {
                return Err(EngineError::NotGroupSession(session_id));
            }
            BookingKind::Group {
                max_participants,
                enrolled,
                ..
            } => {
                if enrolled.contains(&client_id) {
                    return Err(EngineError::AlreadyEnrolled(client_id));
                }
                if enrolled.len() as u32 >= *max_participants {
                    return Err(EngineError::LimitExceeded("session full"));
                }
            }
        }

        let event = CalendarEvent::ClientEnrolled {
            id: session_id,
            trainer_id,
            client_id,
            at: now,
        };
        self.persist_and_apply(trainer_id, &mut guard, &event).await?;
        guard
            .booking(session_id)
            .cloned()
            .ok_or(EngineError::NotFound(session_id))
    }

    /// Shared skeleton for the single-booking transitions: resolve, guard,
    /// build the event, commit, return the updated booking.
    async fn transition(
        &self,
        booking_id: BookingId,
        expected_version: Option<u64>,
        action: Action,
        make_event: impl FnOnce(TrainerId, Ms) -> CalendarEvent,
    ) -> Result<Booking, EngineError> {
        let (trainer_id, mut guard) = self.resolve_booking_write(booking_id).await?;
        let now = now_ms();

        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        ensure_version(booking, expected_version)?;
        ensure_transition(booking, action, now)?;

        let event = make_event(trainer_id, now);
        self.persist_and_apply(trainer_id, &mut guard, &event).await?;
        guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    // ── Journal compaction ───────────────────────────────────────

    /// Rewrite the journal with a snapshot that recreates current state:
    /// one SlotAdded per slot, one BookingCreated per booking (bookings
    /// carry their full status and version, so history replays exactly).
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let mut snapshot = Vec::new();
        let trainer_ids: Vec<TrainerId> = self.calendars.iter().map(|e| *e.key()).collect();
        for trainer_id in trainer_ids {
            let Some(cal) = self.get_calendar(&trainer_id) else {
                continue;
            };
            let guard = cal.read().await;
            for slot in &guard.slots {
                snapshot.push(CalendarEvent::SlotAdded { slot: slot.clone() });
            }
            for booking in &guard.bookings {
                snapshot.push(CalendarEvent::BookingCreated {
                    booking: booking.clone(),
                });
            }
        }
        self.journal
            .compact(snapshot)
            .await
            .map_err(|e| EngineError::Journal(e.to_string()))
    }
}
