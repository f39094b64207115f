//! Error types for SyncBridge.

use std::fmt;
use std::io;
use std::path::PathBuf;
use syncbridge_values::ValueError;
use thiserror::Error;

/// Result type for SyncBridge operations.
pub type SyncBridgeResult<T> = Result<T, SyncBridgeError>;

/// Broad classification of an engine-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Sync client errors (session, connection, protocol).
    Sync,
    /// App services errors (auth, functions, user management).
    App,
    /// HTTP-level failures reaching the server.
    Http,
    /// Anything the engine could not classify.
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Sync => "sync",
            ErrorCategory::App => "app",
            ErrorCategory::Http => "http",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Opaque token the engine uses to identify a pending manual reset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecoveryToken(pub String);

/// Details attached to a client-reset error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientResetInfo {
    /// Path of the store being reset.
    pub original_path: PathBuf,
    /// Path of the pre-reset backup copy.
    pub backup_path: PathBuf,
    /// Token for the engine's recovery action.
    pub action_token: RecoveryToken,
}

/// An error reported by the underlying sync engine.
///
/// The classification code and diagnostic URL are preserved verbatim so
/// callers can act on them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{category} error {code}: {message}")]
pub struct EngineError {
    /// Engine-specific error code.
    pub code: i32,
    /// Error category.
    pub category: ErrorCategory,
    /// Human-readable message.
    pub message: String,
    /// Server log URL for diagnosing the failure, if any.
    pub diagnostic_url: Option<String>,
    /// Whether the owning session can never recover from this error.
    pub fatal: bool,
    /// Present when the error is a client-reset condition.
    pub reset_info: Option<ClientResetInfo>,
}

impl EngineError {
    /// Creates a non-fatal engine error.
    pub fn new(category: ErrorCategory, code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            category,
            message: message.into(),
            diagnostic_url: None,
            fatal: false,
            reset_info: None,
        }
    }

    /// Creates a client-reset error.
    pub fn client_reset(code: i32, message: impl Into<String>, info: ClientResetInfo) -> Self {
        Self::new(ErrorCategory::Sync, code, message).with_reset_info(info)
    }

    /// Sets the diagnostic URL.
    pub fn with_diagnostic_url(mut self, url: impl Into<String>) -> Self {
        self.diagnostic_url = Some(url.into());
        self
    }

    /// Marks the error as fatal for its session.
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    /// Attaches client-reset details.
    pub fn with_reset_info(mut self, info: ClientResetInfo) -> Self {
        self.reset_info = Some(info);
        self
    }

    /// Returns true if this error signals a client reset.
    pub fn is_client_reset(&self) -> bool {
        self.reset_info.is_some()
    }
}

/// Errors surfaced to SyncBridge callers.
#[derive(Error, Debug)]
pub enum SyncBridgeError {
    /// The engine reported neither a value nor an error.
    #[error("{operation} failed")]
    OperationFailed {
        /// Name of the operation.
        operation: &'static str,
    },

    /// Pass-through of an engine error.
    #[error(transparent)]
    EngineReported(#[from] EngineError),

    /// A client reset could not be handled locally.
    #[error("client reset unresolved (error {code}): {message}")]
    ClientResetUnresolved {
        /// Code of the original reset error.
        code: i32,
        /// Message of the original reset error.
        message: String,
    },

    /// The session has permanently failed.
    #[error("session has permanently failed")]
    TokenAfterSessionFailure,

    /// The store must not be used until it is reopened.
    #[error("store is unusable after an unresolved client reset")]
    StoreUnusable,

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// A result value had an unexpected shape.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SyncBridgeError {
    /// Creates the generic failure for an operation.
    pub fn operation_failed(operation: &'static str) -> Self {
        Self::OperationFailed { operation }
    }

    /// Returns the wrapped engine error, if any.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            SyncBridgeError::EngineReported(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the diagnostic URL of a wrapped engine error.
    pub fn diagnostic_url(&self) -> Option<&str> {
        self.engine_error()
            .and_then(|e| e.diagnostic_url.as_deref())
    }

    /// Returns true if the error leaves the session or store unusable.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncBridgeError::ClientResetUnresolved { .. }
            | SyncBridgeError::StoreUnusable
            | SyncBridgeError::TokenAfterSessionFailure => true,
            SyncBridgeError::EngineReported(e) => e.fatal,
            _ => false,
        }
    }
}
