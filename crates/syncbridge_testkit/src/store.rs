//! Mock stores and a scripted client-reset integrator.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use syncbridge_core::{
    FrozenStore, IntegrationFailure, LiveStore, ResetIntegrator, ResetStrategy, StoreRead,
};

/// In-memory stand-in for a store handle.
#[derive(Debug, Clone)]
pub struct MockStore {
    path: PathBuf,
    schema_version: u64,
    objects: HashMap<String, usize>,
    frozen: bool,
    refreshes: Arc<AtomicUsize>,
}

impl MockStore {
    /// A frozen snapshot at `path`.
    pub fn frozen(path: impl Into<PathBuf>) -> Self {
        Self::with_frozen(path.into(), true)
    }

    /// A live handle at `path`.
    pub fn live(path: impl Into<PathBuf>) -> Self {
        Self::with_frozen(path.into(), false)
    }

    fn with_frozen(path: PathBuf, frozen: bool) -> Self {
        Self {
            path,
            schema_version: 1,
            objects: HashMap::new(),
            frozen,
            refreshes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sets the object count for a class.
    pub fn with_objects(mut self, class: impl Into<String>, count: usize) -> Self {
        self.objects.insert(class.into(), count);
        self
    }

    /// Sets the schema version.
    pub fn with_schema_version(mut self, version: u64) -> Self {
        self.schema_version = version;
        self
    }

    /// Number of `refresh` calls.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl StoreRead for MockStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn schema_version(&self) -> u64 {
        self.schema_version
    }

    fn object_count(&self, class: &str) -> usize {
        self.objects.get(class).copied().unwrap_or(0)
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }
}

impl FrozenStore for MockStore {}

impl LiveStore for MockStore {
    fn refresh(&self) -> bool {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        false
    }
}

/// [`ResetIntegrator`] whose outcomes are set up front.
///
/// Strategies succeed unless told to fail. Every attempt is recorded in
/// order.
pub struct ScriptedIntegrator {
    before: MockStore,
    after: MockStore,
    recovery_available: bool,
    snapshot_failure: Option<IntegrationFailure>,
    failures: HashMap<ResetStrategy, IntegrationFailure>,
    attempts: Mutex<Vec<ResetStrategy>>,
    snapshots: AtomicUsize,
}

impl ScriptedIntegrator {
    /// Creates an integrator for the store at `path` with recovery available.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            before: MockStore::frozen(path.clone()),
            after: MockStore::live(path),
            recovery_available: true,
            snapshot_failure: None,
            failures: HashMap::new(),
            attempts: Mutex::new(Vec::new()),
            snapshots: AtomicUsize::new(0),
        }
    }

    /// Sets whether the server allows recovery.
    pub fn with_recovery_available(mut self, available: bool) -> Self {
        self.recovery_available = available;
        self
    }

    /// Makes `strategy` fail with `failure`.
    pub fn failing(mut self, strategy: ResetStrategy, failure: IntegrationFailure) -> Self {
        self.failures.insert(strategy, failure);
        self
    }

    /// Makes the frozen snapshot fail.
    pub fn with_snapshot_failure(mut self, failure: IntegrationFailure) -> Self {
        self.snapshot_failure = Some(failure);
        self
    }

    /// Sets the snapshot handed to the before hook.
    pub fn with_before_state(mut self, store: MockStore) -> Self {
        self.before = store;
        self
    }

    /// Sets the live store handed to the after hook.
    pub fn with_after_state(mut self, store: MockStore) -> Self {
        self.after = store;
        self
    }

    /// Strategies attempted, in order.
    pub fn attempts(&self) -> Vec<ResetStrategy> {
        self.attempts.lock().clone()
    }

    /// Number of snapshots taken.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }
}

impl ResetIntegrator for ScriptedIntegrator {
    fn frozen_snapshot(&self) -> Result<Box<dyn FrozenStore>, IntegrationFailure> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        match &self.snapshot_failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(Box::new(self.before.clone())),
        }
    }

    fn recovery_available(&self) -> bool {
        self.recovery_available
    }

    fn integrate(
        &self,
        strategy: ResetStrategy,
    ) -> Result<Box<dyn LiveStore>, IntegrationFailure> {
        self.attempts.lock().push(strategy);
        match self.failures.get(&strategy) {
            Some(failure) => Err(failure.clone()),
            None => Ok(Box::new(self.after.clone())),
        }
    }
}
