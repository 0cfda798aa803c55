pub mod config;
pub mod engine;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;

pub use config::EngineConfig;
pub use engine::{Engine, EngineError};
pub use model::{
    AvailabilitySlot, Booking, BookingKind, BookingPage, BookingStatus, ConflictReason,
    ConflictReport, Recurrence, TimeRange,
};
