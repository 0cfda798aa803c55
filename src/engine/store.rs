use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::model::CalendarEvent;
use crate::wal::Wal;

/// Persistence seam for committed calendar events. The engine appends on
/// every commit and periodically swaps in a compacted snapshot; which
/// storage technology sits behind that is not the engine's concern.
#[async_trait]
pub trait EventJournal: Send + Sync {
    async fn append(&self, event: &CalendarEvent) -> io::Result<()>;
    /// Atomically replace history with a snapshot that recreates live state.
    async fn compact(&self, snapshot: Vec<CalendarEvent>) -> io::Result<()>;
    async fn appends_since_compact(&self) -> u64;
}

// ── WAL-backed journal with group commit ─────────────────────────

enum WalCommand {
    Append {
        event: CalendarEvent,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<CalendarEvent>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// File-backed [`EventJournal`]. A background task owns the [`Wal`] and
/// batches concurrent appends into a single fsync (group commit).
pub struct WalJournal {
    tx: mpsc::Sender<WalCommand>,
}

impl WalJournal {
    /// Replay existing history from `path`, then take over the file for
    /// appending. Returns the journal and the replayed events. Must run
    /// inside a tokio runtime — the writer task is spawned here.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<CalendarEvent>)> {
        let history = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(writer_loop(wal, rx));
        Ok((Self { tx }, history))
    }

    async fn roundtrip<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> WalCommand,
    ) -> io::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| io::Error::other("journal writer shut down"))?;
        rx.await
            .map_err(|_| io::Error::other("journal writer dropped response"))
    }
}

#[async_trait]
impl EventJournal for WalJournal {
    async fn append(&self, event: &CalendarEvent) -> io::Result<()> {
        let event = event.clone();
        self.roundtrip(|response| WalCommand::Append { event, response })
            .await?
    }

    async fn compact(&self, snapshot: Vec<CalendarEvent>) -> io::Result<()> {
        self.roundtrip(|response| WalCommand::Compact {
            events: snapshot,
            response,
        })
        .await?
    }

    async fn appends_since_compact(&self) -> u64 {
        self.roundtrip(|response| WalCommand::AppendsSinceCompact { response })
            .await
            .unwrap_or(0)
    }
}

/// Writer task: block on the first append, drain whatever else is already
/// queued, write the whole batch with one fsync, then answer every waiter.
async fn writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut trailing = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch first, then handle it.
                            trailing = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty
                    }
                }

                metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let started = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
                    .record(started.elapsed().as_secs_f64());

                for (_, tx) in batch {
                    let r = match &result {
                        Ok(()) => Ok(()),
                        Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
                    };
                    let _ = tx.send(r);
                }

                if let Some(cmd) = trailing {
                    handle_non_append(&mut wal, cmd);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(CalendarEvent, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partially buffered bytes don't
    // bleed into the next batch (these callers are told the batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── In-memory journal ────────────────────────────────────────────

/// Volatile [`EventJournal`] for tests and ephemeral deployments. Can be
/// told to fail so callers can exercise their infrastructure-fault paths.
#[derive(Default)]
pub struct MemoryJournal {
    events: Mutex<Vec<CalendarEvent>>,
    appends_since_compact: AtomicU64,
    fail: AtomicBool,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        self.events.lock().unwrap().clone()
    }

    /// While set, every append and compact reports an I/O error.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    fn check_failing(&self) -> io::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(io::Error::other("journal unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EventJournal for MemoryJournal {
    async fn append(&self, event: &CalendarEvent) -> io::Result<()> {
        self.check_failing()?;
        self.events.lock().unwrap().push(event.clone());
        self.appends_since_compact.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn compact(&self, snapshot: Vec<CalendarEvent>) -> io::Result<()> {
        self.check_failing()?;
        *self.events.lock().unwrap() = snapshot;
        self.appends_since_compact.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact.load(Ordering::SeqCst)
    }
}
