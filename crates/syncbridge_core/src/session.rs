//! Per-store sync session.

use crate::config::Configuration;
use crate::engine::ResetIntegrator;
use crate::error::{EngineError, SyncBridgeError, SyncBridgeResult};
use crate::progress::{Progress, ProgressDirection, ProgressMode, ProgressRegistry, ProgressToken};
use crate::reset::{ClientResetCoordinator, ErrorHandler, ResetOutcome, ResetState};
use parking_lot::RwLock;
use std::fmt;
use tracing::{error, warn};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The session is usable.
    Active,
    /// The engine reported a fatal error.
    PermanentlyFailed,
    /// A client reset was left unresolved; the store must not be written.
    Unusable,
}

/// Wraps one engine sync session.
///
/// Owns the session's progress registry and client-reset coordinator, and
/// routes engine events to them.
pub struct SyncSession {
    config: Configuration,
    registry: ProgressRegistry,
    coordinator: ClientResetCoordinator,
    error_handler: Option<ErrorHandler>,
    state: RwLock<SessionState>,
}

impl SyncSession {
    /// Creates a session for a store opened with `config`.
    ///
    /// `error_handler` is the session-wide handler. It receives non-reset
    /// errors and serves as the manual reset handler when the reset mode
    /// has none.
    pub fn new(
        config: Configuration,
        error_handler: Option<ErrorHandler>,
    ) -> SyncBridgeResult<Self> {
        let coordinator = ClientResetCoordinator::new(
            config.client_reset_mode().clone(),
            config.discard_fallback(),
            error_handler.clone(),
        );
        Ok(Self {
            config,
            registry: ProgressRegistry::new()?,
            coordinator,
            error_handler,
            state: RwLock::new(SessionState::Active),
        })
    }

    /// Configuration the store was opened with.
    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Client-reset state.
    pub fn reset_state(&self) -> ResetState {
        self.coordinator.state()
    }

    /// Progress registry of this session.
    pub fn progress(&self) -> &ProgressRegistry {
        &self.registry
    }

    /// Registers a progress callback. See
    /// [`ProgressRegistry::add_progress_notification`].
    pub fn add_progress_notification(
        &self,
        direction: ProgressDirection,
        mode: ProgressMode,
        callback: impl FnMut(Progress) + Send + 'static,
    ) -> Option<ProgressToken> {
        self.registry
            .add_progress_notification(direction, mode, callback)
    }

    /// Engine entry point for raw progress updates.
    pub fn progress_observed(
        &self,
        direction: ProgressDirection,
        transferred: u64,
        transferrable: u64,
    ) {
        self.registry.observe(direction, transferred, transferrable);
    }

    /// Engine entry point for session errors other than client resets.
    pub fn report_error(&self, error: EngineError) {
        if error.fatal {
            self.fail(SessionState::PermanentlyFailed);
        }
        match &self.error_handler {
            Some(handler) => handler(&error),
            None => warn!(%error, "unhandled sync session error"),
        }
    }

    /// Engine entry point for client-reset events.
    ///
    /// An unresolved reset leaves the session permanently failed and the
    /// store unusable.
    pub fn handle_client_reset(
        &self,
        error: EngineError,
        integrator: &dyn ResetIntegrator,
    ) -> ResetOutcome {
        let outcome = self.coordinator.handle_reset(error, integrator);
        if let ResetOutcome::Failed(e) = &outcome {
            if self.coordinator.state() == ResetState::Unresolved {
                error!(error = %e, "store is unusable until reopened");
                self.fail(SessionState::Unusable);
            }
        }
        outcome
    }

    /// Returns true while the store may be written.
    pub fn is_usable(&self) -> bool {
        self.state() != SessionState::Unusable
    }

    /// Errors if the store must not be used.
    pub fn ensure_usable(&self) -> SyncBridgeResult<()> {
        match self.state() {
            SessionState::Unusable => Err(SyncBridgeError::StoreUnusable),
            _ => Ok(()),
        }
    }

    fn fail(&self, state: SessionState) {
        {
            let mut current = self.state.write();
            if *current == SessionState::Unusable {
                return;
            }
            *current = state;
        }
        self.registry.mark_session_failed();
    }
}

impl fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSession")
            .field("user_id", &self.config.user_id())
            .field("state", &self.state())
            .field("reset_state", &self.reset_state())
            .field("registry", &self.registry)
            .finish()
    }
}
