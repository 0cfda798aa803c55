mod availability;
mod conflict;
mod error;
mod lifecycle;
mod mutations;
mod queries;
mod store;

pub use availability::{
    WEEK_MS, coverage, expand_slot, free_ranges, merge_ranges, slots_overlap, subtract_ranges,
};
pub use error::EngineError;
pub use store::{EventJournal, MemoryJournal, WalJournal};

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;

pub type SharedCalendar = Arc<RwLock<CalendarState>>;

/// The scheduling coordinator. Each trainer's calendar is an isolated
/// aggregate behind its own `RwLock`; mutations serialize per trainer and
/// never block other trainers' calendars.
pub struct Engine {
    pub(crate) calendars: DashMap<TrainerId, SharedCalendar>,
    /// Reverse lookup: booking or slot id → owning trainer.
    pub(crate) owner_index: DashMap<Ulid, TrainerId>,
    journal: Arc<dyn EventJournal>,
    pub notify: Arc<NotifyHub>,
    pub config: EngineConfig,
}

/// Apply a committed event to a calendar. No locking — the caller holds the
/// write lock (or is the sole owner during replay). Unknown booking ids are
/// ignored: the journal is the source of truth and replay must not fail on
/// history written by a newer build.
fn apply_event(
    cs: &mut CalendarState,
    event: &CalendarEvent,
    owner_index: &DashMap<Ulid, TrainerId>,
) {
    match event {
        CalendarEvent::SlotAdded { slot } => {
            owner_index.insert(slot.id, slot.trainer_id);
            cs.insert_slot(slot.clone());
        }
        CalendarEvent::SlotRemoved { id, .. } => {
            cs.remove_slot(*id);
            owner_index.remove(id);
        }
        CalendarEvent::BookingCreated { booking } => {
            owner_index.insert(booking.id, booking.trainer_id);
            cs.insert_booking(booking.clone());
        }
        CalendarEvent::BookingRescheduled { id, interval, at, .. } => {
            // Take + reinsert keeps the vec sorted by the new start.
            if let Some(mut booking) = cs.take_booking(*id) {
                booking.interval = *interval;
                booking.updated_at = *at;
                booking.version += 1;
                cs.insert_booking(booking);
            }
        }
        CalendarEvent::BookingConfirmed { id, at, .. } => {
            if let Some(booking) = cs.booking_mut(*id) {
                booking.status = BookingStatus::Confirmed;
                booking.updated_at = *at;
                booking.version += 1;
            }
        }
        CalendarEvent::BookingCancelled { id, at, reason, .. } => {
            if let Some(booking) = cs.booking_mut(*id) {
                booking.status = BookingStatus::Cancelled;
                booking.cancelled_at = Some(*at);
                booking.cancel_reason = reason.clone();
                booking.updated_at = *at;
                booking.version += 1;
            }
        }
        CalendarEvent::BookingCompleted { id, at, .. } => {
            if let Some(booking) = cs.booking_mut(*id) {
                booking.status = BookingStatus::Completed;
                booking.updated_at = *at;
                booking.version += 1;
            }
        }
        CalendarEvent::BookingNoShow { id, at, .. } => {
            if let Some(booking) = cs.booking_mut(*id) {
                booking.status = BookingStatus::NoShow;
                booking.updated_at = *at;
                booking.version += 1;
            }
        }
        CalendarEvent::ClientEnrolled { id, client_id, at, .. } => {
            if let Some(booking) = cs.booking_mut(*id) {
                if let BookingKind::Group { enrolled, .. } = &mut booking.kind {
                    enrolled.push(*client_id);
                }
                booking.updated_at = *at;
                booking.version += 1;
            }
        }
    }
}

impl Engine {
    /// Build an engine over any journal, seeded from replayed history.
    pub fn with_journal(
        journal: Arc<dyn EventJournal>,
        history: Vec<CalendarEvent>,
        notify: Arc<NotifyHub>,
        config: EngineConfig,
    ) -> Self {
        let engine = Self {
            calendars: DashMap::new(),
            owner_index: DashMap::new(),
            journal,
            notify,
            config,
        };
        for event in &history {
            let cal = engine.calendar_entry(event.trainer_id());
            // Sole owner of the Arc during replay — never contended.
            let mut guard = cal.try_write().expect("replay: uncontended write");
            apply_event(&mut guard, event, &engine.owner_index);
        }
        engine
    }

    /// WAL-backed engine: replay `wal_path`, then append to it. Must run
    /// inside a tokio runtime.
    pub fn open(
        wal_path: &Path,
        notify: Arc<NotifyHub>,
        config: EngineConfig,
    ) -> std::io::Result<Self> {
        let (journal, history) = WalJournal::open(wal_path)?;
        Ok(Self::with_journal(Arc::new(journal), history, notify, config))
    }

    pub(crate) fn get_calendar(&self, trainer_id: &TrainerId) -> Option<SharedCalendar> {
        self.calendars.get(trainer_id).map(|e| e.value().clone())
    }

    /// Get or lazily create a trainer's calendar.
    pub(crate) fn calendar_entry(&self, trainer_id: TrainerId) -> SharedCalendar {
        if let Some(cal) = self.calendars.get(&trainer_id) {
            return cal.value().clone();
        }
        let cal = self
            .calendars
            .entry(trainer_id)
            .or_insert_with(|| Arc::new(RwLock::new(CalendarState::new(trainer_id))))
            .clone();
        metrics::gauge!(crate::observability::CALENDARS_ACTIVE).set(self.calendars.len() as f64);
        cal
    }

    pub(crate) fn trainer_for(&self, entity_id: &Ulid) -> Option<TrainerId> {
        self.owner_index.get(entity_id).map(|e| *e.value())
    }

    /// Acquire a trainer's exclusive scope, bounded by the configured
    /// lock-wait deadline. On timeout nothing has been applied.
    pub(crate) async fn lock_calendar(
        &self,
        cal: &SharedCalendar,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<CalendarState>, EngineError> {
        let started = Instant::now();
        match tokio::time::timeout(self.config.lock_wait, cal.clone().write_owned()).await {
            Ok(guard) => {
                metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
                    .record(started.elapsed().as_secs_f64());
                Ok(guard)
            }
            Err(_) => {
                metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL).increment(1);
                Err(EngineError::Timeout)
            }
        }
    }

    /// Resolve a booking id to its trainer and take the write lock.
    pub(crate) async fn resolve_booking_write(
        &self,
        booking_id: BookingId,
    ) -> Result<(TrainerId, tokio::sync::OwnedRwLockWriteGuard<CalendarState>), EngineError> {
        let trainer_id = self
            .trainer_for(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let cal = self
            .get_calendar(&trainer_id)
            .ok_or(EngineError::NotFound(trainer_id))?;
        let guard = self.lock_calendar(&cal).await?;
        Ok((trainer_id, guard))
    }

    /// Journal-append (with bounded retry), apply, publish — the single
    /// commit point for every mutation. The caller holds the write lock, so
    /// the retry backoff is deliberately short.
    pub(crate) async fn persist_and_apply(
        &self,
        trainer_id: TrainerId,
        cs: &mut CalendarState,
        event: &CalendarEvent,
    ) -> Result<(), EngineError> {
        let mut attempt = 0u32;
        loop {
            match self.journal.append(event).await {
                Ok(()) => break,
                Err(e) if attempt < JOURNAL_RETRY_LIMIT => {
                    attempt += 1;
                    metrics::counter!(crate::observability::JOURNAL_RETRIES_TOTAL).increment(1);
                    tracing::warn!(attempt, "journal append failed, retrying: {e}");
                    tokio::time::sleep(Duration::from_millis(JOURNAL_RETRY_BACKOFF_MS)).await;
                }
                Err(e) => return Err(EngineError::Journal(e.to_string())),
            }
        }
        apply_event(cs, event, &self.owner_index);
        self.notify.publish(trainer_id, event);
        metrics::counter!(
            crate::observability::OPERATIONS_TOTAL,
            "op" => crate::observability::event_label(event),
            "status" => "ok"
        )
        .increment(1);
        tracing::info!(
            op = crate::observability::event_label(event),
            %trainer_id,
            "committed"
        );
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        self.journal.appends_since_compact().await
    }
}
