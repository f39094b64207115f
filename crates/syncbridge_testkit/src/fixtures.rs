//! Test fixtures and blocking helpers.
//!
//! Provides error fixtures, a temporary store directory, a progress
//! recorder and a way to wait on a pending operation from a plain test.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use syncbridge_core::{
    ClientResetInfo, EngineError, ErrorCategory, PendingOperation, Progress, RecoveryToken,
    SyncBridgeResult,
};
use tempfile::TempDir;

/// Engine code for a client reset requested by the server.
pub const CLIENT_RESET_CODE: i32 = 132;

/// How long [`wait`] blocks before failing the test.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A non-fatal sync error.
pub fn engine_error(code: i32, message: &str) -> EngineError {
    EngineError::new(ErrorCategory::Sync, code, message)
}

/// A fatal sync error.
pub fn fatal_error(code: i32, message: &str) -> EngineError {
    engine_error(code, message).fatal()
}

/// A client-reset error for the store at `original`.
pub fn reset_error(original: &Path) -> EngineError {
    EngineError::client_reset(
        CLIENT_RESET_CODE,
        "bad client file identifier",
        ClientResetInfo {
            original_path: original.to_path_buf(),
            backup_path: original.with_extension("backup"),
            action_token: RecoveryToken("reset-1".into()),
        },
    )
    .with_diagnostic_url("https://logs.example.com/reset/1")
}

/// A temporary directory for store files, removed on drop.
pub struct TestStoreDir {
    dir: TempDir,
}

impl TestStoreDir {
    /// Creates a fresh directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a store file named `name`.
    pub fn store_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{name}.store"))
    }
}

impl Default for TestStoreDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects progress callbacks for later inspection.
#[derive(Debug, Clone, Default)]
pub struct ProgressRecorder {
    seen: Arc<Mutex<Vec<Progress>>>,
}

impl ProgressRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that records into this recorder.
    pub fn callback(&self) -> impl FnMut(Progress) + Send + 'static {
        let seen = Arc::clone(&self.seen);
        move |progress| seen.lock().push(progress)
    }

    /// Everything recorded so far.
    pub fn seen(&self) -> Vec<Progress> {
        self.seen.lock().clone()
    }

    /// Number of callbacks recorded.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

/// Blocks until `op` resolves through its callback form.
///
/// # Panics
///
/// Panics if the operation does not resolve within [`WAIT_TIMEOUT`].
pub fn wait<T: Send + 'static>(op: PendingOperation<T>) -> SyncBridgeResult<T> {
    let (tx, rx) = mpsc::channel();
    op.on_complete(move |result| {
        let _ = tx.send(result);
    });
    rx.recv_timeout(WAIT_TIMEOUT)
        .expect("operation did not resolve in time")
}
