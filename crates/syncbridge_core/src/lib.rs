//! # SyncBridge Core
//!
//! Caller-facing layer over an offline-first sync engine.
//!
//! This crate provides:
//! - One completion primitive exposed as a callback, a single-item stream
//!   and a future
//! - User operations and remote function calls
//! - Client-reset policies with before/after hooks and a manual fallback
//! - Progress notifications with bounded and indefinite reporting
//! - Sync configuration built from a user and a sync target
//!
//! ## Architecture
//!
//! The engine is reached through the [`AppTransport`] and
//! [`ResetIntegrator`] traits. The engine completes every operation through
//! a [`Completion`]; callers consume the matching [`PendingOperation`] in
//! whichever form suits them.
//!
//! ## Key Invariants
//!
//! - Every operation resolves exactly once, with a value or an error
//! - An invalidated progress token is never called again
//! - Reset hooks run at most once per reset event
//! - A reset nobody handles leaves the store unusable
//!
//! ## Example
//!
//! ```ignore
//! let app = App::new("my-app", transport);
//! let user = app.log_in(Credentials::Anonymous).await?;
//! let total: i64 = user.function("sum").call_as(vec![1.into(), 2.into()]).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod app;
mod config;
mod delivery;
mod engine;
mod error;
mod progress;
mod reset;
mod session;

pub use app::{App, FunctionProxy, User};
pub use config::{
    Configuration, ConfigurationBuilder, EngineResetMode, InitialSubscriptions,
    InitialSubscriptionsCallback, SyncTarget,
};
pub use delivery::{Completion, OperationResult, PendingOperation};
#[cfg(feature = "async")]
pub use delivery::{OperationFuture, OperationStream};
pub use engine::{
    AppTransport, Credentials, FrozenStore, FunctionCall, IntegrationFailure, LiveStore,
    ResetIntegrator, StoreRead, UserIdentity, UserProfile,
};
pub use error::{
    ClientResetInfo, EngineError, ErrorCategory, RecoveryToken, SyncBridgeError, SyncBridgeResult,
};
pub use progress::{
    Progress, ProgressCallback, ProgressDirection, ProgressMode, ProgressRegistry, ProgressToken,
};
pub use reset::{
    AfterResetHook, BeforeResetHook, ClientResetCoordinator, ClientResetMode, ErrorHandler,
    ResetOutcome, ResetState, ResetStrategy,
};
pub use session::{SessionState, SyncSession};
pub use syncbridge_values::{Document, ObjectId, Value, ValueError};
