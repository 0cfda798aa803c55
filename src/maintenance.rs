use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that rewrites the journal from a snapshot of live state
/// once enough appends have accumulated. Run one per engine.
pub async fn run_compactor(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let appends = engine.journal_appends_since_compact().await;
        if appends < engine.config.compact_threshold {
            continue;
        }
        match engine.compact_journal().await {
            Ok(()) => info!(appends, "journal compacted"),
            Err(e) => tracing::warn!("journal compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::MemoryJournal;
    use crate::engine::EventJournal;
    use crate::model::{Recurrence, TimeRange};
    use crate::notify::NotifyHub;
    use ulid::Ulid;

    #[tokio::test(start_paused = true)]
    async fn compactor_rewrites_once_threshold_crossed() {
        let journal = Arc::new(MemoryJournal::new());
        let config = EngineConfig {
            compact_threshold: 5,
            ..EngineConfig::default()
        };
        let engine = Arc::new(Engine::with_journal(
            journal.clone(),
            Vec::new(),
            Arc::new(NotifyHub::new()),
            config,
        ));

        let trainer = Ulid::new();
        for i in 0..6i64 {
            engine
                .add_slot(
                    trainer,
                    TimeRange::new(i * 10_000, i * 10_000 + 5_000),
                    Recurrence::OneOff,
                    None,
                )
                .await
                .unwrap();
        }
        assert_eq!(journal.appends_since_compact().await, 6);

        tokio::spawn(run_compactor(engine.clone()));
        tokio::time::sleep(COMPACT_CHECK_INTERVAL + Duration::from_secs(1)).await;

        assert_eq!(journal.appends_since_compact().await, 0);
        // Snapshot still recreates the six slots.
        assert_eq!(journal.events().len(), 6);
    }
}
