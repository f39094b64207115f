//! Transfer-progress notifications for a sync session.
//!
//! The engine reports raw `(transferred, transferrable)` byte counts per
//! direction through [`ProgressRegistry::observe`]. Callers subscribe with
//! [`ProgressRegistry::add_progress_notification`] and keep the returned
//! [`ProgressToken`] for as long as they want updates.
//!
//! Delivery guarantees:
//! - Observed updates are delivered on a dedicated notification thread.
//! - A single token sees updates in observation order; stale ones are skipped.
//! - Tokens are independent; there is no ordering between different tokens.
//! - After [`ProgressToken::invalidate`] no new delivery starts for that
//!   token. One already running may finish.

use crate::error::{SyncBridgeError, SyncBridgeResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, trace, warn};

const WORKER_NAME: &str = "syncbridge-progress";

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressDirection {
    /// Local changes being sent to the server.
    Upload,
    /// Server changes being received.
    Download,
}

impl ProgressDirection {
    fn index(self) -> usize {
        match self {
            ProgressDirection::Upload => 0,
            ProgressDirection::Download => 1,
        }
    }
}

/// How long a subscription keeps reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressMode {
    /// Report every update until the token is invalidated.
    ReportIndefinitely,
    /// Report against the work outstanding at registration, then stop.
    ForCurrentlyOutstandingWork,
}

/// A snapshot of transfer progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Bytes transferred so far.
    pub transferred_bytes: u64,
    /// Bytes that need to be transferred.
    pub transferrable_bytes: u64,
}

impl Progress {
    /// Creates a progress snapshot.
    pub const fn new(transferred_bytes: u64, transferrable_bytes: u64) -> Self {
        Self {
            transferred_bytes,
            transferrable_bytes,
        }
    }

    /// Fraction transferred in `[0, 1]`; `1.0` when nothing is transferrable.
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction_transferred(&self) -> f64 {
        if self.transferrable_bytes == 0 {
            return 1.0;
        }
        let fraction = self.transferred_bytes as f64 / self.transferrable_bytes as f64;
        fraction.min(1.0)
    }

    /// Returns true once everything transferrable has been transferred.
    pub fn is_transfer_complete(&self) -> bool {
        self.transferred_bytes >= self.transferrable_bytes
    }
}

/// Callback invoked with progress updates.
pub type ProgressCallback = Box<dyn FnMut(Progress) + Send>;

#[derive(Debug, Clone, Copy)]
struct Observation {
    sequence: u64,
    progress: Progress,
}

struct DeliveryState {
    callback: ProgressCallback,
    captured_transferrable: Option<u64>,
    last_sequence: u64,
}

struct TokenEntry {
    id: u64,
    direction: ProgressDirection,
    mode: ProgressMode,
    active: AtomicBool,
    delivery: Mutex<DeliveryState>,
}

impl TokenEntry {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct TokenTable {
    tokens: HashMap<u64, Arc<TokenEntry>>,
    latest: [Option<Observation>; 2],
    next_id: u64,
    next_sequence: u64,
    failed: bool,
}

struct Shared {
    table: Mutex<TokenTable>,
}

impl Shared {
    fn remove(&self, entry: &TokenEntry) {
        if entry.active.swap(false, Ordering::SeqCst) {
            self.table.lock().tokens.remove(&entry.id);
            debug!(token = entry.id, "progress token invalidated");
        }
    }

    fn deliver(&self, entry: &TokenEntry, observation: Observation) {
        let mut state = entry.delivery.lock();
        if !entry.is_active() {
            trace!(token = entry.id, "skipping delivery to invalidated token");
            return;
        }
        if observation.sequence <= state.last_sequence {
            trace!(
                token = entry.id,
                sequence = observation.sequence,
                "skipping stale observation"
            );
            return;
        }
        state.last_sequence = observation.sequence;

        let progress = match entry.mode {
            ProgressMode::ReportIndefinitely => observation.progress,
            ProgressMode::ForCurrentlyOutstandingWork => {
                let captured = *state
                    .captured_transferrable
                    .get_or_insert(observation.progress.transferrable_bytes);
                Progress::new(observation.progress.transferred_bytes, captured)
            }
        };

        (state.callback)(progress);
        drop(state);

        let outstanding = entry.mode == ProgressMode::ForCurrentlyOutstandingWork;
        if outstanding && progress.is_transfer_complete() {
            debug!(token = entry.id, "outstanding work transferred");
            self.remove(entry);
        }
    }
}

enum Job {
    Deliver {
        entry: Arc<TokenEntry>,
        observation: Observation,
    },
    Flush(Sender<()>),
}

fn run_worker(shared: Arc<Shared>, jobs: Receiver<Job>) {
    while let Ok(job) = jobs.recv() {
        match job {
            Job::Deliver { entry, observation } => shared.deliver(&entry, observation),
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    trace!("progress notification worker stopped");
}

/// Handle to one progress subscription.
///
/// Clones refer to the same subscription. Dropping a token does not
/// unregister it; call [`invalidate`](Self::invalidate).
#[derive(Clone)]
pub struct ProgressToken {
    entry: Arc<TokenEntry>,
    registry: Weak<Shared>,
}

impl ProgressToken {
    /// Stops further notifications. Calling it again is a no-op.
    pub fn invalidate(&self) {
        match self.registry.upgrade() {
            Some(shared) => shared.remove(&self.entry),
            None => self.entry.active.store(false, Ordering::SeqCst),
        }
    }

    /// Returns true while notifications can still be delivered.
    pub fn is_valid(&self) -> bool {
        self.entry.is_active()
    }

    /// Direction this token observes.
    pub fn direction(&self) -> ProgressDirection {
        self.entry.direction
    }

    /// Delivery mode of this token.
    pub fn mode(&self) -> ProgressMode {
        self.entry.mode
    }
}

impl fmt::Debug for ProgressToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressToken")
            .field("id", &self.entry.id)
            .field("direction", &self.entry.direction)
            .field("mode", &self.entry.mode)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Registry of progress subscriptions for one session.
///
/// Registration and invalidation serialize on the token table; delivery
/// never holds the table lock while a callback runs.
pub struct ProgressRegistry {
    shared: Arc<Shared>,
    jobs: Sender<Job>,
}

impl ProgressRegistry {
    /// Creates a registry and starts its notification thread.
    pub fn new() -> SyncBridgeResult<Self> {
        let shared = Arc::new(Shared {
            table: Mutex::new(TokenTable::default()),
        });
        let (jobs, receiver) = mpsc::channel();

        let worker_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || run_worker(worker_shared, receiver))?;

        Ok(Self { shared, jobs })
    }

    /// Registers a progress callback.
    ///
    /// Returns `None`, and never calls `callback`, if the session has
    /// permanently failed. If progress for `direction` is already known the
    /// callback runs once on the calling thread before this returns.
    pub fn add_progress_notification(
        &self,
        direction: ProgressDirection,
        mode: ProgressMode,
        callback: impl FnMut(Progress) + Send + 'static,
    ) -> Option<ProgressToken> {
        let (entry, current) = {
            let mut table = self.shared.table.lock();
            if table.failed {
                debug!(
                    reason = %SyncBridgeError::TokenAfterSessionFailure,
                    "rejecting progress registration"
                );
                return None;
            }

            table.next_id += 1;
            let id = table.next_id;
            let current = table.latest[direction.index()];
            let captured_transferrable = match mode {
                ProgressMode::ForCurrentlyOutstandingWork => {
                    current.map(|o| o.progress.transferrable_bytes)
                }
                ProgressMode::ReportIndefinitely => None,
            };

            let entry = Arc::new(TokenEntry {
                id,
                direction,
                mode,
                active: AtomicBool::new(true),
                delivery: Mutex::new(DeliveryState {
                    callback: Box::new(callback),
                    captured_transferrable,
                    last_sequence: 0,
                }),
            });
            table.tokens.insert(id, Arc::clone(&entry));
            (entry, current)
        };
        debug!(token = entry.id, ?direction, ?mode, "progress token registered");

        if let Some(observation) = current {
            self.shared.deliver(&entry, observation);
        }

        Some(ProgressToken {
            entry,
            registry: Arc::downgrade(&self.shared),
        })
    }

    /// Records a raw progress update from the engine and schedules delivery.
    pub fn observe(&self, direction: ProgressDirection, transferred: u64, transferrable: u64) {
        let (observation, targets) = {
            let mut table = self.shared.table.lock();
            if table.failed {
                return;
            }
            table.next_sequence += 1;
            let observation = Observation {
                sequence: table.next_sequence,
                progress: Progress::new(transferred, transferrable),
            };
            table.latest[direction.index()] = Some(observation);
            let targets: Vec<_> = table
                .tokens
                .values()
                .filter(|e| e.direction == direction)
                .cloned()
                .collect();
            (observation, targets)
        };

        trace!(
            ?direction,
            transferred,
            transferrable,
            subscribers = targets.len(),
            "progress observed"
        );
        for entry in targets {
            if self.jobs.send(Job::Deliver { entry, observation }).is_err() {
                warn!("progress notification worker is gone");
                return;
            }
        }
    }

    /// Latest known progress for a direction.
    pub fn current(&self, direction: ProgressDirection) -> Option<Progress> {
        self.shared.table.lock().latest[direction.index()].map(|o| o.progress)
    }

    /// Invalidates every token and rejects future registrations.
    pub fn mark_session_failed(&self) {
        let drained: Vec<_> = {
            let mut table = self.shared.table.lock();
            if table.failed {
                return;
            }
            table.failed = true;
            table.tokens.drain().map(|(_, e)| e).collect()
        };
        for entry in &drained {
            entry.active.store(false, Ordering::SeqCst);
        }
        debug!(
            invalidated = drained.len(),
            "session failed; progress tokens invalidated"
        );
    }

    /// Returns true once the session has permanently failed.
    pub fn is_session_failed(&self) -> bool {
        self.shared.table.lock().failed
    }

    /// Number of live tokens.
    pub fn token_count(&self) -> usize {
        self.shared.table.lock().tokens.len()
    }

    /// Blocks until every delivery scheduled so far has run.
    ///
    /// Called from a progress callback this returns immediately, since the
    /// notification thread cannot wait on its own queue.
    pub fn flush(&self) {
        if thread::current().name() == Some(WORKER_NAME) {
            trace!("flush from the notification thread ignored");
            return;
        }
        let (done, wait) = mpsc::channel();
        if self.jobs.send(Job::Flush(done)).is_ok() {
            let _ = wait.recv();
        }
    }
}

impl fmt::Debug for ProgressRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.shared.table.lock();
        f.debug_struct("ProgressRegistry")
            .field("tokens", &table.tokens.len())
            .field("failed", &table.failed)
            .finish()
    }
}
