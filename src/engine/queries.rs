use crate::limits::*;
use crate::model::*;

use super::availability::free_ranges;
use super::conflict::{check, now_ms, validate_range};
use super::{Engine, EngineError};

impl Engine {
    /// Free sub-ranges of a trainer's calendar inside the query window:
    /// slot coverage minus committed bookings. An unknown trainer simply has
    /// no availability.
    ///
    /// This is the authoritative computation — outer layers may cache the
    /// result, but the commit path always recomputes under the trainer's
    /// exclusive scope and never consults a cache.
    pub async fn free_intervals(
        &self,
        trainer_id: TrainerId,
        query_start: Ms,
        query_end: Ms,
    ) -> Result<Vec<TimeRange>, EngineError> {
        if query_start >= query_end {
            return Err(EngineError::InvalidInterval("start must be before end"));
        }
        if query_start < MIN_VALID_TIMESTAMP_MS || query_end > MAX_VALID_TIMESTAMP_MS {
            return Err(EngineError::InvalidInterval("timestamp out of range"));
        }
        if query_end - query_start > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }

        let Some(cal) = self.get_calendar(&trainer_id) else {
            return Ok(Vec::new());
        };
        let guard = cal.read().await;
        let query = TimeRange::new(query_start, query_end);
        Ok(free_ranges(
            &guard,
            &query,
            now_ms(),
            None,
            self.config.cancelled_grace_ms,
        ))
    }

    /// Advisory dry-run of the conflict detector. The verdict can go stale
    /// the moment it is returned; a create call re-checks under the lock.
    pub async fn check_availability(
        &self,
        trainer_id: TrainerId,
        candidate: TimeRange,
    ) -> Result<ConflictReport, EngineError> {
        validate_range(&candidate)?;
        let now = now_ms();
        match self.get_calendar(&trainer_id) {
            Some(cal) => {
                let guard = cal.read().await;
                Ok(check(&guard, &candidate, now, &self.config, None))
            }
            None => Ok(check(
                &CalendarState::new(trainer_id),
                &candidate,
                now,
                &self.config,
                None,
            )),
        }
    }

    /// One page of a trainer's bookings, newest session first, optionally
    /// filtered by status. `page` is 1-based; `limit` is clamped.
    pub async fn list_bookings(
        &self,
        trainer_id: TrainerId,
        status: Option<BookingStatus>,
        page: usize,
        limit: usize,
    ) -> Result<BookingPage, EngineError> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);

        let Some(cal) = self.get_calendar(&trainer_id) else {
            return Ok(BookingPage {
                bookings: Vec::new(),
                page,
                limit,
                total: 0,
            });
        };
        let guard = cal.read().await;

        let matching: Vec<&Booking> = guard
            .bookings
            .iter()
            .rev()
            .filter(|b| status.is_none_or(|s| b.status == s))
            .collect();
        let total = matching.len();
        let bookings = matching
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .cloned()
            .collect();

        Ok(BookingPage {
            bookings,
            page,
            limit,
            total,
        })
    }

    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking, EngineError> {
        let trainer_id = self
            .trainer_for(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let cal = self
            .get_calendar(&trainer_id)
            .ok_or(EngineError::NotFound(trainer_id))?;
        let guard = cal.read().await;
        guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    pub async fn list_slots(&self, trainer_id: TrainerId) -> Vec<AvailabilitySlot> {
        match self.get_calendar(&trainer_id) {
            Some(cal) => cal.read().await.slots.clone(),
            None => Vec::new(),
        }
    }
}
