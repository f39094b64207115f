//! Caller-facing app and user operations.
//!
//! Every asynchronous call returns a [`PendingOperation`], so each one can
//! be consumed with a callback, as a stream, or with `.await`.
//!
//! Remote functions are called by name through [`User::call_function`] or
//! a [`FunctionProxy`] built from [`User::function`].

use crate::config::{ConfigurationBuilder, SyncTarget};
use crate::delivery::{Completion, PendingOperation};
use crate::engine::{AppTransport, Credentials, FunctionCall, UserIdentity, UserProfile};
use crate::error::SyncBridgeError;
use std::fmt;
use std::sync::Arc;
use syncbridge_values::{Document, Value, ValueError};

/// Entry point for user operations against one app.
#[derive(Clone)]
pub struct App {
    app_id: String,
    transport: Arc<dyn AppTransport>,
}

impl App {
    /// Creates an app backed by the given engine transport.
    pub fn new(app_id: impl Into<String>, transport: Arc<dyn AppTransport>) -> Self {
        Self {
            app_id: app_id.into(),
            transport,
        }
    }

    /// App identifier.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Logs in.
    pub fn log_in(&self, credentials: Credentials) -> PendingOperation<User> {
        let transport = Arc::clone(&self.transport);
        let user_transport = Arc::clone(&self.transport);
        PendingOperation::new("log_in", move |completion: Completion<UserProfile>| {
            transport.log_in(&credentials, completion);
        })
        .and_then(move |profile| Ok(User::new(profile, user_transport)))
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App").field("app_id", &self.app_id).finish()
    }
}

/// A logged-in user.
#[derive(Clone)]
pub struct User {
    profile: UserProfile,
    transport: Arc<dyn AppTransport>,
}

impl User {
    fn new(profile: UserProfile, transport: Arc<dyn AppTransport>) -> Self {
        Self { profile, transport }
    }

    /// User identifier.
    pub fn id(&self) -> &str {
        &self.profile.id
    }

    /// Linked identities, as of login or the last link.
    pub fn identities(&self) -> &[UserIdentity] {
        &self.profile.identities
    }

    /// Custom data, as of login.
    pub fn custom_data(&self) -> &Document {
        &self.profile.custom_data
    }

    /// Links another identity. Resolves with the updated user.
    pub fn link_identity(&self, credentials: Credentials) -> PendingOperation<User> {
        let transport = Arc::clone(&self.transport);
        let user_transport = Arc::clone(&self.transport);
        let user_id = self.profile.id.clone();
        PendingOperation::new("link_identity", move |completion: Completion<UserProfile>| {
            transport.link_identity(&user_id, &credentials, completion);
        })
        .and_then(move |profile| Ok(User::new(profile, user_transport)))
    }

    /// Removes the user from this device.
    pub fn remove(&self) -> PendingOperation<()> {
        let transport = Arc::clone(&self.transport);
        let user_id = self.profile.id.clone();
        PendingOperation::new("remove_user", move |completion| {
            transport.remove_user(&user_id, completion);
        })
    }

    /// Logs the user out.
    pub fn log_out(&self) -> PendingOperation<()> {
        let transport = Arc::clone(&self.transport);
        let user_id = self.profile.id.clone();
        PendingOperation::new("log_out", move |completion| {
            transport.log_out(&user_id, completion);
        })
    }

    /// Deletes the user on the server.
    pub fn delete(&self) -> PendingOperation<()> {
        let transport = Arc::clone(&self.transport);
        let user_id = self.profile.id.clone();
        PendingOperation::new("delete_user", move |completion| {
            transport.delete_user(&user_id, completion);
        })
    }

    /// Re-fetches custom user data.
    pub fn refresh_custom_data(&self) -> PendingOperation<Document> {
        let transport = Arc::clone(&self.transport);
        let user_id = self.profile.id.clone();
        PendingOperation::new("refresh_custom_data", move |completion| {
            transport.refresh_custom_data(&user_id, completion);
        })
    }

    /// Calls a remote function by name.
    pub fn call_function(
        &self,
        name: impl Into<String>,
        arguments: Vec<Value>,
    ) -> PendingOperation<Value> {
        self.function(name).call(arguments)
    }

    /// Builds a proxy for the named remote function.
    pub fn function(&self, name: impl Into<String>) -> FunctionProxy {
        FunctionProxy {
            user: self.clone(),
            name: name.into(),
            service: None,
        }
    }

    /// Starts a sync configuration for this user.
    pub fn configuration(&self, target: SyncTarget) -> ConfigurationBuilder {
        ConfigurationBuilder::new(self.profile.id.clone(), target)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.profile.id)
            .field("identities", &self.profile.identities.len())
            .finish()
    }
}

/// A remote function bound to a user and a name.
#[derive(Debug, Clone)]
pub struct FunctionProxy {
    user: User,
    name: String,
    service: Option<String>,
}

impl FunctionProxy {
    /// Scopes the call to a service.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls the function.
    pub fn call(&self, arguments: Vec<Value>) -> PendingOperation<Value> {
        let transport = Arc::clone(&self.user.transport);
        let user_id = self.user.profile.id.clone();
        let call = FunctionCall {
            name: self.name.clone(),
            arguments,
            service: self.service.clone(),
        };
        PendingOperation::new("call_function", move |completion| {
            transport.call_function(&user_id, call, completion);
        })
    }

    /// Calls the function and converts the result.
    pub fn call_as<R>(&self, arguments: Vec<Value>) -> PendingOperation<R>
    where
        R: TryFrom<Value, Error = ValueError> + Send + 'static,
    {
        self.call(arguments)
            .and_then(|value| R::try_from(value).map_err(SyncBridgeError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ErrorCategory};
    use parking_lot::Mutex;
    use std::sync::mpsc;

    #[derive(Default)]
    struct Echo {
        calls: Mutex<Vec<FunctionCall>>,
    }

    impl AppTransport for Echo {
        fn log_in(&self, credentials: &Credentials, completion: Completion<UserProfile>) {
            match credentials {
                Credentials::Anonymous => completion.succeed(UserProfile::new("anon")),
                _ => completion.fail(EngineError::new(ErrorCategory::App, 50, "invalid password")),
            }
        }

        fn link_identity(
            &self,
            user_id: &str,
            credentials: &Credentials,
            completion: Completion<UserProfile>,
        ) {
            let mut profile = UserProfile::new(user_id);
            profile.identities.push(UserIdentity {
                id: "linked".into(),
                provider: credentials.provider().into(),
            });
            completion.succeed(profile);
        }

        fn remove_user(&self, _user_id: &str, completion: Completion<()>) {
            completion.finish(None);
        }

        fn log_out(&self, _user_id: &str, completion: Completion<()>) {
            completion.finish(None);
        }

        fn delete_user(&self, _user_id: &str, completion: Completion<()>) {
            completion.finish(Some(EngineError::new(ErrorCategory::App, 4, "forbidden")));
        }

        fn refresh_custom_data(&self, _user_id: &str, completion: Completion<Document>) {
            completion.succeed(Document::new().with("tier", "gold"));
        }

        fn call_function(&self, _user_id: &str, call: FunctionCall, completion: Completion<Value>) {
            let first = call.arguments.first().cloned();
            self.calls.lock().push(call);
            completion.complete(first, None);
        }
    }

    fn wait<T: Send + 'static>(op: PendingOperation<T>) -> crate::error::SyncBridgeResult<T> {
        let (tx, rx) = mpsc::channel();
        op.on_complete(move |r| {
            let _ = tx.send(r);
        });
        rx.recv().unwrap()
    }

    fn logged_in() -> (Arc<Echo>, User) {
        let echo = Arc::new(Echo::default());
        let app = App::new("app-1", echo.clone());
        let user = wait(app.log_in(Credentials::Anonymous)).unwrap();
        (echo, user)
    }

    #[test]
    fn log_in_produces_user() {
        let (_, user) = logged_in();
        assert_eq!(user.id(), "anon");
        assert!(user.identities().is_empty());
    }

    #[test]
    fn log_in_failure_is_passed_through() {
        let app = App::new("app-1", Arc::new(Echo::default()));
        let err = wait(app.log_in(Credentials::Jwt("bad".into()))).unwrap_err();
        assert_eq!(err.engine_error().map(|e| e.code), Some(50));
    }

    #[test]
    fn void_operations() {
        let (_, user) = logged_in();
        assert!(wait(user.log_out()).is_ok());
        assert!(wait(user.remove()).is_ok());
        assert!(wait(user.delete()).is_err());
    }

    #[test]
    fn link_identity_returns_updated_user() {
        let (_, user) = logged_in();
        let linked = wait(user.link_identity(Credentials::ApiKey("k".into()))).unwrap();
        assert_eq!(linked.identities()[0].provider, "api-key");
    }

    #[test]
    fn refresh_custom_data() {
        let (_, user) = logged_in();
        let data = wait(user.refresh_custom_data()).unwrap();
        assert_eq!(data.get("tier"), Some(&Value::from("gold")));
    }

    #[test]
    fn function_proxy_builds_request() {
        let (echo, user) = logged_in();
        let result = wait(
            user.function("sum")
                .with_service("mongodb-atlas")
                .call(vec![Value::from(3), Value::from(4)]),
        )
        .unwrap();
        assert_eq!(result, Value::Int32(3));

        let calls = echo.calls.lock();
        assert_eq!(calls[0].name, "sum");
        assert_eq!(calls[0].service.as_deref(), Some("mongodb-atlas"));
        assert_eq!(calls[0].arguments.len(), 2);
    }

    #[test]
    fn empty_function_result_fails() {
        let (_, user) = logged_in();
        let err = wait(user.call_function("noop", vec![])).unwrap_err();
        assert!(matches!(
            err,
            SyncBridgeError::OperationFailed {
                operation: "call_function"
            }
        ));
    }

    #[test]
    fn typed_function_result() {
        let (_, user) = logged_in();
        let n: i64 = wait(user.function("id").call_as(vec![Value::from(9i64)])).unwrap();
        assert_eq!(n, 9);

        let err = wait(user.function("id").call_as::<String>(vec![Value::from(9i64)])).unwrap_err();
        assert!(matches!(err, SyncBridgeError::Value(_)));
    }

    #[test]
    fn configuration_uses_user_id() {
        let (_, user) = logged_in();
        let config = user.configuration(SyncTarget::Flexible).build();
        assert_eq!(config.user_id(), "anon");
    }
}
