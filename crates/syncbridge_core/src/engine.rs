//! Boundary with the underlying sync engine.
//!
//! The engine owns stores, sessions, networking and the client-reset merge
//! itself. SyncBridge only sees it through the traits in this module, so
//! any engine (or a test double) can be plugged in.

use crate::delivery::Completion;
use crate::error::EngineError;
use crate::reset::ResetStrategy;
use std::fmt;
use std::path::Path;
use syncbridge_values::{Document, Value};
use thiserror::Error;

/// Credentials for logging in or linking an identity.
#[derive(Clone, PartialEq)]
pub enum Credentials {
    /// Anonymous login.
    Anonymous,
    /// Email and password.
    EmailPassword {
        /// Account email.
        email: String,
        /// Account password.
        password: String,
    },
    /// Server or user API key.
    ApiKey(String),
    /// Custom JWT.
    Jwt(String),
    /// Payload for a custom function provider.
    Function(Document),
}

impl Credentials {
    /// Returns the provider name the engine expects.
    pub fn provider(&self) -> &'static str {
        match self {
            Credentials::Anonymous => "anon-user",
            Credentials::EmailPassword { .. } => "local-userpass",
            Credentials::ApiKey(_) => "api-key",
            Credentials::Jwt(_) => "custom-token",
            Credentials::Function(_) => "custom-function",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::EmailPassword { email, .. } => f
                .debug_struct("EmailPassword")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
            other => f
                .debug_tuple("Credentials")
                .field(&other.provider())
                .finish(),
        }
    }
}

/// One identity linked to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Provider-specific identifier.
    pub id: String,
    /// Provider name.
    pub provider: String,
}

/// A user as reported by the engine after login or linking.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    /// User identifier.
    pub id: String,
    /// Linked identities.
    pub identities: Vec<UserIdentity>,
    /// Custom user data, as last fetched.
    pub custom_data: Document,
}

impl UserProfile {
    /// Creates a profile with no identities and empty custom data.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            identities: Vec::new(),
            custom_data: Document::new(),
        }
    }
}

/// A remote function invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,
    /// Positional arguments.
    pub arguments: Vec<Value>,
    /// Service name, if the function is scoped to one.
    pub service: Option<String>,
}

/// Raw callback-based user and function API of the engine.
///
/// Every method must eventually fire its completion exactly once, from any
/// thread. Void operations fire with only an optional error.
pub trait AppTransport: Send + Sync {
    /// Logs in with the given credentials.
    fn log_in(&self, credentials: &Credentials, completion: Completion<UserProfile>);

    /// Links another identity to an existing user.
    fn link_identity(
        &self,
        user_id: &str,
        credentials: &Credentials,
        completion: Completion<UserProfile>,
    );

    /// Removes the user from the device.
    fn remove_user(&self, user_id: &str, completion: Completion<()>);

    /// Logs the user out.
    fn log_out(&self, user_id: &str, completion: Completion<()>);

    /// Deletes the user on the server.
    fn delete_user(&self, user_id: &str, completion: Completion<()>);

    /// Re-fetches the user's custom data.
    fn refresh_custom_data(&self, user_id: &str, completion: Completion<Document>);

    /// Calls a remote function as the user.
    fn call_function(&self, user_id: &str, call: FunctionCall, completion: Completion<Value>);
}

/// Read capability shared by frozen snapshots and live stores.
pub trait StoreRead: Send + Sync {
    /// Path of the store file.
    fn path(&self) -> &Path;

    /// Schema version of the store.
    fn schema_version(&self) -> u64;

    /// Number of objects of the given class.
    fn object_count(&self, class_name: &str) -> usize;

    /// Returns true for immutable snapshots.
    fn is_frozen(&self) -> bool;
}

/// Read-only snapshot of a store at a fixed version.
pub trait FrozenStore: StoreRead {}

/// Mutable live handle to an open store.
pub trait LiveStore: StoreRead {
    /// Advances the handle to the latest version. Returns true if it moved.
    fn refresh(&self) -> bool;
}

/// Why an automatic client-reset integration could not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrationFailure {
    /// Local schema changes cannot be applied to the fresh server state.
    #[error("incompatible schema change: {0}")]
    SchemaIncompatible(String),

    /// The server has recovery mode disabled.
    #[error("recovery is disabled on the server")]
    RecoveryDisabled,

    /// Any other engine failure during integration.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Engine-side handle to one client-reset event.
///
/// The engine performs the actual merge; SyncBridge decides which strategy
/// to try and when.
pub trait ResetIntegrator {
    /// Returns a frozen snapshot of the local state before the reset.
    fn frozen_snapshot(&self) -> Result<Box<dyn FrozenStore>, IntegrationFailure>;

    /// Returns true if the server allows recovering unsynced changes.
    fn recovery_available(&self) -> bool;

    /// Integrates fresh server state with the given strategy.
    fn integrate(&self, strategy: ResetStrategy) -> Result<Box<dyn LiveStore>, IntegrationFailure>;
}
