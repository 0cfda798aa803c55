use std::net::SocketAddr;

use crate::model::CalendarEvent;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: coordinator operations. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "traincal_operations_total";

/// Counter: bookings rejected by the conflict detector.
pub const CONFLICTS_TOTAL: &str = "traincal_conflicts_total";

/// Histogram: time spent waiting for a trainer's calendar lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "traincal_lock_wait_seconds";

/// Counter: mutations abandoned because the lock-wait deadline passed.
pub const LOCK_TIMEOUTS_TOTAL: &str = "traincal_lock_timeouts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: trainer calendars resident in memory.
pub const CALENDARS_ACTIVE: &str = "traincal_calendars_active";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "traincal_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "traincal_journal_flush_batch_size";

/// Counter: journal append retries after an infrastructure fault.
pub const JOURNAL_RETRIES_TOTAL: &str = "traincal_journal_retries_total";

/// Install the Prometheus exporter on the given port. No-op if `port` is
/// None — metrics macros then record into the void, which is free.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Short operation label for an event, used in metric labels and logs.
pub fn event_label(event: &CalendarEvent) -> &'static str {
    match event {
        CalendarEvent::SlotAdded { .. } => "add_slot",
        CalendarEvent::SlotRemoved { .. } => "remove_slot",
        CalendarEvent::BookingCreated { .. } => "create_booking",
        CalendarEvent::BookingRescheduled { .. } => "reschedule_booking",
        CalendarEvent::BookingConfirmed { .. } => "confirm_booking",
        CalendarEvent::BookingCancelled { .. } => "cancel_booking",
        CalendarEvent::BookingCompleted { .. } => "complete_booking",
        CalendarEvent::BookingNoShow { .. } => "mark_no_show",
        CalendarEvent::ClientEnrolled { .. } => "enroll_client",
    }
}
