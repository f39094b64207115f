//! Scripted in-memory engine transport.
//!
//! Each operation family has its own reply queue. When a queue is empty the
//! transport answers with a plausible default so tests only script what they
//! care about.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use syncbridge_core::{
    AppTransport, Completion, Credentials, EngineError, FunctionCall, UserProfile,
};
use syncbridge_values::{Document, Value};
use tracing::trace;

/// How the mock engine answers one call.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    /// Complete with a value.
    Ok(T),
    /// Complete with an error.
    Err(EngineError),
    /// Complete with neither a value nor an error.
    Empty,
    /// Drop the completion without firing it.
    Dropped,
    /// Hold the completion until the test takes it.
    Deferred,
    /// Complete from another thread after a delay.
    Delayed(Duration, Result<T, EngineError>),
}

/// A call the transport received.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    /// `log_in` with the credentials' provider.
    LogIn(&'static str),
    /// `link_identity`.
    LinkIdentity {
        /// User linked.
        user_id: String,
        /// Provider of the new identity.
        provider: &'static str,
    },
    /// `remove_user`.
    RemoveUser(String),
    /// `log_out`.
    LogOut(String),
    /// `delete_user`.
    DeleteUser(String),
    /// `refresh_custom_data`.
    RefreshCustomData(String),
    /// `call_function`.
    CallFunction {
        /// Calling user.
        user_id: String,
        /// The call.
        call: FunctionCall,
    },
}

struct Script<T> {
    replies: Mutex<VecDeque<Reply<T>>>,
    deferred: Mutex<Vec<Completion<T>>>,
}

impl<T: Send + 'static> Script<T> {
    fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            deferred: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, reply: Reply<T>) {
        self.replies.lock().push_back(reply);
    }

    fn take_deferred(&self) -> Vec<Completion<T>> {
        std::mem::take(&mut *self.deferred.lock())
    }

    fn answer(&self, completion: Completion<T>, default: impl FnOnce() -> T) {
        let reply = self.replies.lock().pop_front();
        match reply {
            None => completion.succeed(default()),
            Some(Reply::Ok(value)) => completion.succeed(value),
            Some(Reply::Err(error)) => completion.fail(error),
            Some(Reply::Empty) => completion.complete(None, None),
            Some(Reply::Dropped) => drop(completion),
            Some(Reply::Deferred) => {
                trace!(operation = completion.operation(), "holding completion");
                self.deferred.lock().push(completion);
            }
            Some(Reply::Delayed(delay, result)) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    match result {
                        Ok(value) => completion.succeed(value),
                        Err(error) => completion.fail(error),
                    }
                });
            }
        }
    }
}

/// In-memory [`AppTransport`] with scripted replies.
pub struct MockTransport {
    calls: Mutex<Vec<RecordedCall>>,
    log_in: Script<UserProfile>,
    link: Script<UserProfile>,
    user_ops: Script<()>,
    custom_data: Script<Document>,
    functions: Script<Value>,
}

impl MockTransport {
    /// Creates a transport with empty scripts.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            log_in: Script::new(),
            link: Script::new(),
            user_ops: Script::new(),
            custom_data: Script::new(),
            functions: Script::new(),
        })
    }

    /// Queues a reply for `log_in`. Defaults to a user named after the provider.
    pub fn script_log_in(&self, reply: Reply<UserProfile>) {
        self.log_in.push(reply);
    }

    /// Queues a reply for `link_identity`.
    pub fn script_link_identity(&self, reply: Reply<UserProfile>) {
        self.link.push(reply);
    }

    /// Queues a reply shared by `remove_user`, `log_out` and `delete_user`.
    pub fn script_user_op(&self, reply: Reply<()>) {
        self.user_ops.push(reply);
    }

    /// Queues a reply for `refresh_custom_data`.
    pub fn script_custom_data(&self, reply: Reply<Document>) {
        self.custom_data.push(reply);
    }

    /// Queues a reply for `call_function`. Defaults to echoing the arguments
    /// as an array.
    pub fn script_function(&self, reply: Reply<Value>) {
        self.functions.push(reply);
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Takes held `log_in` completions.
    pub fn take_deferred_log_ins(&self) -> Vec<Completion<UserProfile>> {
        self.log_in.take_deferred()
    }

    /// Takes held user-operation completions.
    pub fn take_deferred_user_ops(&self) -> Vec<Completion<()>> {
        self.user_ops.take_deferred()
    }

    /// Takes held `call_function` completions.
    pub fn take_deferred_functions(&self) -> Vec<Completion<Value>> {
        self.functions.take_deferred()
    }

    fn record(&self, call: RecordedCall) {
        trace!(?call, "mock transport call");
        self.calls.lock().push(call);
    }
}

impl AppTransport for MockTransport {
    fn log_in(&self, credentials: &Credentials, completion: Completion<UserProfile>) {
        let provider = credentials.provider();
        self.record(RecordedCall::LogIn(provider));
        self.log_in
            .answer(completion, || UserProfile::new(format!("{provider}-user")));
    }

    fn link_identity(
        &self,
        user_id: &str,
        credentials: &Credentials,
        completion: Completion<UserProfile>,
    ) {
        self.record(RecordedCall::LinkIdentity {
            user_id: user_id.to_owned(),
            provider: credentials.provider(),
        });
        let user_id = user_id.to_owned();
        self.link.answer(completion, || UserProfile::new(user_id));
    }

    fn remove_user(&self, user_id: &str, completion: Completion<()>) {
        self.record(RecordedCall::RemoveUser(user_id.to_owned()));
        self.user_ops.answer(completion, || ());
    }

    fn log_out(&self, user_id: &str, completion: Completion<()>) {
        self.record(RecordedCall::LogOut(user_id.to_owned()));
        self.user_ops.answer(completion, || ());
    }

    fn delete_user(&self, user_id: &str, completion: Completion<()>) {
        self.record(RecordedCall::DeleteUser(user_id.to_owned()));
        self.user_ops.answer(completion, || ());
    }

    fn refresh_custom_data(&self, user_id: &str, completion: Completion<Document>) {
        self.record(RecordedCall::RefreshCustomData(user_id.to_owned()));
        self.custom_data.answer(completion, Document::new);
    }

    fn call_function(&self, user_id: &str, call: FunctionCall, completion: Completion<Value>) {
        let echo = Value::Array(call.arguments.clone());
        self.record(RecordedCall::CallFunction {
            user_id: user_id.to_owned(),
            call,
        });
        self.functions.answer(completion, || echo);
    }
}
