//! Client-reset policies and the coordinator that applies them.
//!
//! A client reset happens when the server can no longer integrate the local
//! history, so local unsynced state and server state have diverged. The
//! engine detects the condition and performs any merge; this module picks
//! the strategy, runs the user hooks at the right points and decides when
//! to fall back to manual handling.
//!
//! ## State machine
//!
//! ```text
//! Idle -> ResetDetected -> AutomaticInProgress -> Resolved
//!                 |                 |
//!                 +--> ManualPending <+
//!                          |
//!                          +--> Resolved | Unresolved
//! ```
//!
//! `RecoverOrDiscard` tries recovery, then discard, then manual.

use crate::engine::{FrozenStore, IntegrationFailure, LiveStore, ResetIntegrator};
use crate::error::{EngineError, SyncBridgeError, SyncBridgeResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Hook run with a frozen snapshot before an automatic reset integrates.
pub type BeforeResetHook = Arc<dyn Fn(&dyn FrozenStore) + Send + Sync>;

/// Hook run after a successful automatic reset with the pre-reset snapshot
/// and the live post-reset store.
pub type AfterResetHook = Arc<dyn Fn(&dyn FrozenStore, &dyn LiveStore) + Send + Sync>;

/// Handler invoked with the original error when a reset needs manual handling.
pub type ErrorHandler = Arc<dyn Fn(&EngineError) + Send + Sync>;

/// Integration strategy the engine is asked to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetStrategy {
    /// Re-apply unsynced local changes on top of the server state.
    Recover,
    /// Drop unsynced local changes and take the server state.
    Discard,
}

/// How a client reset is handled.
#[derive(Clone)]
pub enum ClientResetMode {
    /// Hand the error to a handler and let the application decide.
    Manual {
        /// Handler for the reset error. Falls back to the session handler.
        error_handler: Option<ErrorHandler>,
    },
    /// Discard unsynced local changes.
    DiscardUnsynced {
        /// Runs before integration.
        before: Option<BeforeResetHook>,
        /// Runs after integration.
        after: Option<AfterResetHook>,
    },
    /// Recover unsynced local changes; manual if recovery is impossible.
    RecoverUnsynced {
        /// Runs before integration.
        before: Option<BeforeResetHook>,
        /// Runs after integration.
        after: Option<AfterResetHook>,
    },
    /// Recover unsynced local changes, discarding them if recovery fails.
    RecoverOrDiscard {
        /// Runs before integration.
        before: Option<BeforeResetHook>,
        /// Runs after integration.
        after: Option<AfterResetHook>,
    },
}

impl ClientResetMode {
    /// Manual mode without its own handler.
    pub fn manual() -> Self {
        ClientResetMode::Manual {
            error_handler: None,
        }
    }

    /// Manual mode with a handler.
    pub fn manual_with_handler(handler: impl Fn(&EngineError) + Send + Sync + 'static) -> Self {
        let handler: ErrorHandler = Arc::new(handler);
        ClientResetMode::Manual {
            error_handler: Some(handler),
        }
    }

    /// Discard mode without hooks.
    pub fn discard_unsynced() -> Self {
        ClientResetMode::DiscardUnsynced {
            before: None,
            after: None,
        }
    }

    /// Recover mode without hooks.
    pub fn recover_unsynced() -> Self {
        ClientResetMode::RecoverUnsynced {
            before: None,
            after: None,
        }
    }

    /// Recover-or-discard mode without hooks.
    pub fn recover_or_discard() -> Self {
        ClientResetMode::RecoverOrDiscard {
            before: None,
            after: None,
        }
    }

    /// Sets the before hook. No effect on manual mode.
    pub fn with_before(mut self, hook: impl Fn(&dyn FrozenStore) + Send + Sync + 'static) -> Self {
        let hook: BeforeResetHook = Arc::new(hook);
        if let Some((before, _)) = self.hooks_mut() {
            *before = Some(hook);
        }
        self
    }

    /// Sets the after hook. No effect on manual mode.
    pub fn with_after(
        mut self,
        hook: impl Fn(&dyn FrozenStore, &dyn LiveStore) + Send + Sync + 'static,
    ) -> Self {
        let hook: AfterResetHook = Arc::new(hook);
        if let Some((_, after)) = self.hooks_mut() {
            *after = Some(hook);
        }
        self
    }

    /// Returns true for the three automatic modes.
    pub fn is_automatic(&self) -> bool {
        !matches!(self, ClientResetMode::Manual { .. })
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ClientResetMode::Manual { .. } => "manual",
            ClientResetMode::DiscardUnsynced { .. } => "discardUnsynced",
            ClientResetMode::RecoverUnsynced { .. } => "recoverUnsynced",
            ClientResetMode::RecoverOrDiscard { .. } => "recoverOrDiscard",
        }
    }

    /// The manual handler configured on this mode, if any.
    pub fn error_handler(&self) -> Option<&ErrorHandler> {
        match self {
            ClientResetMode::Manual { error_handler } => error_handler.as_ref(),
            _ => None,
        }
    }

    /// The before hook, if any.
    pub fn before_hook(&self) -> Option<&BeforeResetHook> {
        self.hooks().and_then(|(before, _)| before.as_ref())
    }

    /// The after hook, if any.
    pub fn after_hook(&self) -> Option<&AfterResetHook> {
        self.hooks().and_then(|(_, after)| after.as_ref())
    }

    /// Strategies to try in order, given what the server allows.
    ///
    /// An empty plan means manual handling.
    pub fn strategies(
        &self,
        recovery_available: bool,
        discard_fallback: bool,
    ) -> Vec<ResetStrategy> {
        match self {
            ClientResetMode::Manual { .. } => Vec::new(),
            ClientResetMode::DiscardUnsynced { .. } => vec![ResetStrategy::Discard],
            ClientResetMode::RecoverUnsynced { .. } if recovery_available => {
                vec![ResetStrategy::Recover]
            }
            ClientResetMode::RecoverUnsynced { .. } => Vec::new(),
            ClientResetMode::RecoverOrDiscard { .. } if !recovery_available => {
                vec![ResetStrategy::Discard]
            }
            ClientResetMode::RecoverOrDiscard { .. } if discard_fallback => {
                vec![ResetStrategy::Recover, ResetStrategy::Discard]
            }
            ClientResetMode::RecoverOrDiscard { .. } => vec![ResetStrategy::Recover],
        }
    }

    fn hooks(&self) -> Option<(&Option<BeforeResetHook>, &Option<AfterResetHook>)> {
        match self {
            ClientResetMode::Manual { .. } => None,
            ClientResetMode::DiscardUnsynced { before, after }
            | ClientResetMode::RecoverUnsynced { before, after }
            | ClientResetMode::RecoverOrDiscard { before, after } => Some((before, after)),
        }
    }

    fn hooks_mut(
        &mut self,
    ) -> Option<(&mut Option<BeforeResetHook>, &mut Option<AfterResetHook>)> {
        match self {
            ClientResetMode::Manual { .. } => None,
            ClientResetMode::DiscardUnsynced { before, after }
            | ClientResetMode::RecoverUnsynced { before, after }
            | ClientResetMode::RecoverOrDiscard { before, after } => Some((before, after)),
        }
    }
}

impl Default for ClientResetMode {
    fn default() -> Self {
        Self::recover_unsynced()
    }
}

impl fmt::Debug for ClientResetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientResetMode::Manual { error_handler } => f
                .debug_struct("Manual")
                .field("error_handler", &error_handler.is_some())
                .finish(),
            _ => f
                .debug_struct(self.name())
                .field("before", &self.before_hook().is_some())
                .field("after", &self.after_hook().is_some())
                .finish(),
        }
    }
}

/// Where the coordinator is in handling a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetState {
    /// No reset has been reported.
    Idle,
    /// The engine reported a reset.
    ResetDetected,
    /// Waiting on manual handling.
    ManualPending,
    /// An automatic strategy is being integrated.
    AutomaticInProgress,
    /// The reset was handled.
    Resolved,
    /// No handler was available; the store is unusable.
    Unresolved,
}

impl ResetState {
    /// Returns true if a new reset event can be accepted.
    pub fn can_accept_reset(&self) -> bool {
        matches!(self, ResetState::Idle | ResetState::Resolved)
    }
}

/// Result of handling one reset event.
#[derive(Debug)]
pub enum ResetOutcome {
    /// An automatic strategy integrated successfully.
    Applied(ResetStrategy),
    /// A manual handler received the reset error.
    FellBackToManual,
    /// The reset could not be handled.
    Failed(SyncBridgeError),
}

impl ResetOutcome {
    /// Returns true unless the reset failed.
    pub fn is_handled(&self) -> bool {
        !matches!(self, ResetOutcome::Failed(_))
    }
}

/// Applies a [`ClientResetMode`] to reset events reported by the engine.
pub struct ClientResetCoordinator {
    mode: ClientResetMode,
    discard_fallback: bool,
    session_handler: Option<ErrorHandler>,
    state: Mutex<ResetState>,
}

impl ClientResetCoordinator {
    /// Creates a coordinator.
    ///
    /// `discard_fallback` controls whether `RecoverOrDiscard` attempts a
    /// discard after recovery fails. `session_handler` is used when the
    /// mode has no manual handler of its own.
    pub fn new(
        mode: ClientResetMode,
        discard_fallback: bool,
        session_handler: Option<ErrorHandler>,
    ) -> Self {
        Self {
            mode,
            discard_fallback,
            session_handler,
            state: Mutex::new(ResetState::Idle),
        }
    }

    /// Current state.
    pub fn state(&self) -> ResetState {
        *self.state.lock()
    }

    /// The mode being applied.
    pub fn mode(&self) -> &ClientResetMode {
        &self.mode
    }

    fn set_state(&self, state: ResetState) {
        let mut current = self.state.lock();
        debug!(from = ?*current, to = ?state, "client reset state");
        *current = state;
    }

    fn begin(&self) -> SyncBridgeResult<()> {
        let mut current = self.state.lock();
        if !current.can_accept_reset() {
            return Err(SyncBridgeError::InvalidStateTransition {
                from: format!("{:?}", *current),
                to: format!("{:?}", ResetState::ResetDetected),
            });
        }
        *current = ResetState::ResetDetected;
        Ok(())
    }

    /// Handles one reset event.
    ///
    /// Hooks run at most once. The manual handler always receives `error`
    /// itself, never a substitute.
    pub fn handle_reset(
        &self,
        error: EngineError,
        integrator: &dyn ResetIntegrator,
    ) -> ResetOutcome {
        if let Err(e) = self.begin() {
            warn!(error = %e, "client reset rejected");
            return ResetOutcome::Failed(e);
        }
        info!(mode = self.mode.name(), code = error.code, "client reset detected");

        let plan = self
            .mode
            .strategies(integrator.recovery_available(), self.discard_fallback);
        if plan.is_empty() {
            return self.handle_manually(error);
        }

        self.set_state(ResetState::AutomaticInProgress);
        let frozen = match integrator.frozen_snapshot() {
            Ok(frozen) => frozen,
            Err(failure) => {
                warn!(%failure, "could not snapshot local state");
                return self.handle_manually(error);
            }
        };

        if let Some(before) = self.mode.before_hook() {
            before(&*frozen);
        }

        for strategy in plan {
            match integrator.integrate(strategy) {
                Ok(live) => {
                    if let Some(after) = self.mode.after_hook() {
                        after(&*frozen, &*live);
                    }
                    self.set_state(ResetState::Resolved);
                    info!(?strategy, "client reset applied");
                    return ResetOutcome::Applied(strategy);
                }
                Err(failure) => log_integration_failure(strategy, &failure),
            }
        }

        self.handle_manually(error)
    }

    fn handle_manually(&self, error: EngineError) -> ResetOutcome {
        self.set_state(ResetState::ManualPending);

        match self.mode.error_handler().or(self.session_handler.as_ref()) {
            Some(handler) => {
                handler(&error);
                self.set_state(ResetState::Resolved);
                ResetOutcome::FellBackToManual
            }
            None => {
                self.set_state(ResetState::Unresolved);
                error!(
                    code = error.code,
                    message = %error.message,
                    "client reset unresolved: no error handler configured"
                );
                ResetOutcome::Failed(SyncBridgeError::ClientResetUnresolved {
                    code: error.code,
                    message: error.message,
                })
            }
        }
    }
}

fn log_integration_failure(strategy: ResetStrategy, failure: &IntegrationFailure) {
    warn!(?strategy, %failure, "client reset integration failed");
}

impl fmt::Debug for ClientResetCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientResetCoordinator")
            .field("mode", &self.mode)
            .field("discard_fallback", &self.discard_fallback)
            .field("session_handler", &self.session_handler.is_some())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StoreRead;
    use crate::error::{ClientResetInfo, RecoveryToken};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Store {
        path: PathBuf,
        frozen: bool,
    }

    impl StoreRead for Store {
        fn path(&self) -> &Path {
            &self.path
        }
        fn schema_version(&self) -> u64 {
            1
        }
        fn object_count(&self, _class_name: &str) -> usize {
            0
        }
        fn is_frozen(&self) -> bool {
            self.frozen
        }
    }

    impl FrozenStore for Store {}

    impl LiveStore for Store {
        fn refresh(&self) -> bool {
            false
        }
    }

    struct Integrator {
        recovery: bool,
        succeed_with: Option<ResetStrategy>,
        attempts: Mutex<Vec<ResetStrategy>>,
    }

    impl Integrator {
        fn new(recovery: bool, succeed_with: Option<ResetStrategy>) -> Self {
            Self {
                recovery,
                succeed_with,
                attempts: Mutex::new(Vec::new()),
            }
        }
    }

    impl ResetIntegrator for Integrator {
        fn frozen_snapshot(&self) -> Result<Box<dyn FrozenStore>, IntegrationFailure> {
            Ok(Box::new(Store {
                path: "/tmp/before".into(),
                frozen: true,
            }))
        }

        fn recovery_available(&self) -> bool {
            self.recovery
        }

        fn integrate(
            &self,
            strategy: ResetStrategy,
        ) -> Result<Box<dyn LiveStore>, IntegrationFailure> {
            self.attempts.lock().push(strategy);
            if self.succeed_with == Some(strategy) {
                Ok(Box::new(Store {
                    path: "/tmp/after".into(),
                    frozen: false,
                }))
            } else {
                Err(IntegrationFailure::SchemaIncompatible("column removed".into()))
            }
        }
    }

    fn reset_error() -> EngineError {
        EngineError::client_reset(
            132,
            "bad client file",
            ClientResetInfo {
                original_path: "/tmp/app.store".into(),
                backup_path: "/tmp/recovered.store".into(),
                action_token: RecoveryToken("t".into()),
            },
        )
    }

    #[test]
    fn strategy_plans() {
        let mode = ClientResetMode::recover_or_discard();
        assert_eq!(
            mode.strategies(true, true),
            vec![ResetStrategy::Recover, ResetStrategy::Discard]
        );
        assert_eq!(mode.strategies(true, false), vec![ResetStrategy::Recover]);
        assert_eq!(mode.strategies(false, false), vec![ResetStrategy::Discard]);

        assert!(ClientResetMode::recover_unsynced()
            .strategies(false, true)
            .is_empty());
        assert_eq!(
            ClientResetMode::discard_unsynced().strategies(false, true),
            vec![ResetStrategy::Discard]
        );
        assert!(ClientResetMode::manual().strategies(true, true).is_empty());
    }

    #[test]
    fn hooks_are_ignored_on_manual() {
        let mode = ClientResetMode::manual().with_before(|_| {});
        assert!(mode.before_hook().is_none());
        assert!(!mode.is_automatic());
    }

    #[test]
    fn discard_applies_and_runs_hooks_once() {
        let before_calls = Arc::new(AtomicUsize::new(0));
        let after_calls = Arc::new(AtomicUsize::new(0));
        let b = Arc::clone(&before_calls);
        let a = Arc::clone(&after_calls);
        let mode = ClientResetMode::discard_unsynced()
            .with_before(move |frozen| {
                assert!(frozen.is_frozen());
                b.fetch_add(1, Ordering::SeqCst);
            })
            .with_after(move |frozen, live| {
                assert!(frozen.is_frozen());
                assert!(!live.is_frozen());
                a.fetch_add(1, Ordering::SeqCst);
            });

        let coordinator = ClientResetCoordinator::new(mode, true, None);
        let integrator = Integrator::new(true, Some(ResetStrategy::Discard));
        let outcome = coordinator.handle_reset(reset_error(), &integrator);

        assert!(matches!(outcome, ResetOutcome::Applied(ResetStrategy::Discard)));
        assert_eq!(coordinator.state(), ResetState::Resolved);
        assert_eq!(before_calls.load(Ordering::SeqCst), 1);
        assert_eq!(after_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recover_without_server_support_goes_manual() {
        let handled = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&handled);
        let handler: ErrorHandler = Arc::new(move |_: &EngineError| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let coordinator =
            ClientResetCoordinator::new(ClientResetMode::recover_unsynced(), true, Some(handler));
        let integrator = Integrator::new(false, Some(ResetStrategy::Recover));

        let outcome = coordinator.handle_reset(reset_error(), &integrator);
        assert!(matches!(outcome, ResetOutcome::FellBackToManual));
        assert!(integrator.attempts.lock().is_empty());
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unresolved_without_handler() {
        let coordinator = ClientResetCoordinator::new(ClientResetMode::manual(), true, None);
        let integrator = Integrator::new(true, None);

        let outcome = coordinator.handle_reset(reset_error(), &integrator);
        match outcome {
            ResetOutcome::Failed(SyncBridgeError::ClientResetUnresolved { code, .. }) => {
                assert_eq!(code, 132)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(coordinator.state(), ResetState::Unresolved);

        let again = coordinator.handle_reset(reset_error(), &integrator);
        assert!(matches!(
            again,
            ResetOutcome::Failed(SyncBridgeError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn resolved_coordinator_accepts_next_reset() {
        let coordinator =
            ClientResetCoordinator::new(ClientResetMode::discard_unsynced(), true, None);
        let integrator = Integrator::new(true, Some(ResetStrategy::Discard));

        assert!(coordinator.handle_reset(reset_error(), &integrator).is_handled());
        assert!(coordinator.handle_reset(reset_error(), &integrator).is_handled());
        assert_eq!(integrator.attempts.lock().len(), 2);
    }
}
