use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{CalendarEvent, TrainerId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-trainer broadcast of committed calendar events. The API and cache
/// layers subscribe to invalidate or push updates; nothing here delivers
/// anything to end users.
pub struct NotifyHub {
    channels: DashMap<TrainerId, broadcast::Sender<CalendarEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to one trainer's calendar. Creates the channel if needed.
    pub fn subscribe(&self, trainer_id: TrainerId) -> broadcast::Receiver<CalendarEvent> {
        let sender = self
            .channels
            .entry(trainer_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish a committed event. No-op if nobody is listening.
    pub fn publish(&self, trainer_id: TrainerId, event: &CalendarEvent) {
        if let Some(sender) = self.channels.get(&trainer_id) {
            let _ = sender.send(event.clone());
        }
    }
}
