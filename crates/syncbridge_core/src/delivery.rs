//! Result delivery for one-shot engine operations.
//!
//! A [`PendingOperation`] wraps a raw engine call that reports
//! `(Option<T>, Option<EngineError>)` through a [`Completion`]. The same
//! pending operation can be consumed in one of three ways:
//!
//! - [`PendingOperation::on_complete`] with a callback,
//! - [`PendingOperation::into_stream`] as a one-item `Stream`,
//! - `.await` through `IntoFuture`.
//!
//! All three share a single completion slot, so the raw call is written
//! once and delivery happens exactly once.
//!
//! # Usage
//!
//! ```rust,ignore
//! let user = app.log_in(Credentials::Anonymous).await?;
//!
//! user.log_out().on_complete(|result| {
//!     if let Err(e) = result {
//!         eprintln!("log out failed: {e}");
//!     }
//! });
//! ```

use crate::error::{EngineError, SyncBridgeError, SyncBridgeResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::task::Waker;
use tracing::{debug, trace, warn};

#[cfg(feature = "async")]
use std::future::{Future, IntoFuture};
#[cfg(feature = "async")]
use std::pin::Pin;
#[cfg(feature = "async")]
use std::task::{Context, Poll};

/// Result delivered by a pending operation.
pub type OperationResult<T> = SyncBridgeResult<T>;

type Callback<T> = Box<dyn FnOnce(OperationResult<T>) + Send>;
type Starter<T> = Box<dyn FnOnce(Completion<T>) + Send>;

enum SlotState<T> {
    Waiting {
        waker: Option<Waker>,
        callback: Option<Callback<T>>,
    },
    Ready(OperationResult<T>),
    Consumed,
    #[cfg(feature = "async")]
    Cancelled,
}

/// The one place a result can land.
struct Slot<T> {
    operation: &'static str,
    state: Mutex<SlotState<T>>,
}

impl<T> Slot<T> {
    fn with_callback(operation: &'static str, callback: Callback<T>) -> Self {
        Self {
            operation,
            state: Mutex::new(SlotState::Waiting {
                waker: None,
                callback: Some(callback),
            }),
        }
    }

    #[cfg(feature = "async")]
    fn with_waker(operation: &'static str, waker: Waker) -> Self {
        Self {
            operation,
            state: Mutex::new(SlotState::Waiting {
                waker: Some(waker),
                callback: None,
            }),
        }
    }

    fn fulfil(&self, result: OperationResult<T>) {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SlotState::Consumed) {
            SlotState::Waiting {
                callback: Some(callback),
                ..
            } => {
                drop(state);
                trace!(operation = self.operation, "delivering to callback");
                callback(result);
            }
            SlotState::Waiting {
                callback: None,
                waker,
            } => {
                *state = SlotState::Ready(result);
                drop(state);
                if let Some(waker) = waker {
                    waker.wake();
                }
            }
            #[cfg(feature = "async")]
            SlotState::Cancelled => {
                *state = SlotState::Cancelled;
                debug!(
                    operation = self.operation,
                    "discarding result of cancelled operation"
                );
            }
            previous => {
                *state = previous;
                warn!(
                    operation = self.operation,
                    "ignoring duplicate completion"
                );
            }
        }
    }

    /// Takes the result if present, otherwise parks the waker.
    ///
    /// Returns `Ready(None)` once the slot is consumed or cancelled.
    #[cfg(feature = "async")]
    fn poll_take(&self, cx: &mut Context<'_>) -> Poll<Option<OperationResult<T>>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SlotState::Consumed) {
            SlotState::Ready(result) => Poll::Ready(Some(result)),
            SlotState::Waiting { callback, .. } => {
                *state = SlotState::Waiting {
                    waker: Some(cx.waker().clone()),
                    callback,
                };
                Poll::Pending
            }
            SlotState::Cancelled => {
                *state = SlotState::Cancelled;
                Poll::Ready(None)
            }
            SlotState::Consumed => Poll::Ready(None),
        }
    }

    #[cfg(feature = "async")]
    fn cancel(&self) {
        let mut state = self.state.lock();
        if let SlotState::Waiting { .. } | SlotState::Ready(_) = &*state {
            *state = SlotState::Cancelled;
            debug!(operation = self.operation, "consumer cancelled");
        }
    }
}

/// Raw completion handle handed to the engine.
///
/// Firing consumes the handle, so a completion fires at most once. A
/// handle dropped without firing delivers
/// [`SyncBridgeError::OperationFailed`] so no consumer waits forever.
pub struct Completion<T> {
    slot: Option<Arc<Slot<T>>>,
    operation: &'static str,
}

impl<T> Completion<T> {
    fn new(slot: Arc<Slot<T>>) -> Self {
        let operation = slot.operation;
        Self {
            slot: Some(slot),
            operation,
        }
    }

    /// Name of the operation this completion belongs to.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Fires with the engine's raw `(value, error)` pair.
    ///
    /// An error wins over a value. Neither value nor error is a protocol
    /// violation by the engine and resolves as `OperationFailed`.
    pub fn complete(self, value: Option<T>, error: Option<EngineError>) {
        let result = match (value, error) {
            (_, Some(error)) => Err(SyncBridgeError::EngineReported(error)),
            (Some(value), None) => Ok(value),
            (None, None) => {
                warn!(
                    operation = self.operation,
                    "engine reported neither value nor error"
                );
                Err(SyncBridgeError::operation_failed(self.operation))
            }
        };
        self.resolve(result);
    }

    /// Fires with a value.
    pub fn succeed(self, value: T) {
        self.resolve(Ok(value));
    }

    /// Fires with an engine error.
    pub fn fail(self, error: EngineError) {
        self.resolve(Err(error.into()));
    }

    pub(crate) fn resolve(mut self, result: OperationResult<T>) {
        if let Some(slot) = self.slot.take() {
            slot.fulfil(result);
        }
    }
}

impl Completion<()> {
    /// Fires a void operation; `None` means success.
    pub fn finish(self, error: Option<EngineError>) {
        self.complete(Some(()), error);
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            warn!(
                operation = self.operation,
                "completion dropped without firing"
            );
            slot.fulfil(Err(SyncBridgeError::operation_failed(self.operation)));
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("operation", &self.operation)
            .field("fired", &self.slot.is_none())
            .finish()
    }
}

/// A single-use asynchronous engine operation that has not started yet.
///
/// Nothing runs until the operation is consumed through exactly one of its
/// delivery forms.
#[must_use = "a pending operation does nothing until it is consumed"]
pub struct PendingOperation<T> {
    operation: &'static str,
    start: Starter<T>,
}

impl<T: Send + 'static> PendingOperation<T> {
    /// Wraps a raw call that fires the given completion once.
    pub fn new(
        operation: &'static str,
        start: impl FnOnce(Completion<T>) + Send + 'static,
    ) -> Self {
        Self {
            operation,
            start: Box::new(start),
        }
    }

    /// An operation that resolves immediately with the given result.
    pub fn ready(operation: &'static str, result: OperationResult<T>) -> Self {
        Self::new(operation, move |completion| completion.resolve(result))
    }

    /// Name of the operation.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Chains a fallible transformation of the success value.
    pub fn and_then<U, F>(self, f: F) -> PendingOperation<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> OperationResult<U> + Send + 'static,
    {
        let operation = self.operation;
        let start = self.start;
        PendingOperation::new(operation, move |outer: Completion<U>| {
            let slot = Slot::with_callback(
                operation,
                Box::new(move |result: OperationResult<T>| outer.resolve(result.and_then(f))),
            );
            start(Completion::new(Arc::new(slot)));
        })
    }

    /// Starts the operation and invokes `callback` with its result.
    pub fn on_complete(self, callback: impl FnOnce(OperationResult<T>) + Send + 'static) {
        debug!(operation = self.operation, "starting operation");
        let slot = Arc::new(Slot::with_callback(self.operation, Box::new(callback)));
        (self.start)(Completion::new(slot));
    }

    /// Converts into a stream that yields the result once, then ends.
    ///
    /// The operation starts on the first poll.
    #[cfg(feature = "async")]
    pub fn into_stream(self) -> OperationStream<T> {
        OperationStream {
            subscription: Subscription::new(self),
        }
    }
}

impl<T> fmt::Debug for PendingOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

/// Lazily started consumer shared by the stream and future forms.
#[cfg(feature = "async")]
struct Subscription<T> {
    operation: &'static str,
    start: Option<Starter<T>>,
    slot: Option<Arc<Slot<T>>>,
    finished: bool,
}

#[cfg(feature = "async")]
impl<T> Subscription<T> {
    fn new(pending: PendingOperation<T>) -> Self {
        Self {
            operation: pending.operation,
            start: Some(pending.start),
            slot: None,
            finished: false,
        }
    }

    fn poll_result(&mut self, cx: &mut Context<'_>) -> Poll<Option<OperationResult<T>>> {
        if self.finished {
            return Poll::Ready(None);
        }

        if let Some(start) = self.start.take() {
            debug!(operation = self.operation, "starting operation");
            let slot = Arc::new(Slot::with_waker(self.operation, cx.waker().clone()));
            self.slot = Some(Arc::clone(&slot));
            start(Completion::new(slot));
        }

        let Some(slot) = self.slot.as_ref() else {
            self.finished = true;
            return Poll::Ready(None);
        };

        match slot.poll_take(cx) {
            Poll::Ready(result) => {
                self.finished = true;
                Poll::Ready(result)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(feature = "async")]
impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(slot) = self.slot.take() {
                slot.cancel();
            }
        }
    }
}

/// Stream form of a [`PendingOperation`].
///
/// Yields exactly one `Ok` or `Err` item and then ends. Dropping it before
/// the item arrives suppresses delivery; the engine call keeps running.
#[cfg(feature = "async")]
#[must_use = "streams do nothing unless polled"]
pub struct OperationStream<T> {
    subscription: Subscription<T>,
}

#[cfg(feature = "async")]
impl<T> futures::Stream for OperationStream<T> {
    type Item = OperationResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().subscription.poll_result(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.subscription.finished {
            (0, Some(0))
        } else {
            (0, Some(1))
        }
    }
}

#[cfg(feature = "async")]
impl<T> futures::stream::FusedStream for OperationStream<T> {
    fn is_terminated(&self) -> bool {
        self.subscription.finished
    }
}

/// Future form of a [`PendingOperation`].
///
/// Dropping it before completion discards the result; the engine call
/// keeps running in the background.
#[cfg(feature = "async")]
#[must_use = "futures do nothing unless awaited"]
pub struct OperationFuture<T> {
    subscription: Subscription<T>,
}

#[cfg(feature = "async")]
impl<T> Future for OperationFuture<T> {
    type Output = OperationResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.subscription.poll_result(cx) {
            Poll::Ready(Some(result)) => Poll::Ready(result),
            Poll::Ready(None) => Poll::Ready(Err(SyncBridgeError::operation_failed(
                this.subscription.operation,
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(feature = "async")]
impl<T: Send + 'static> IntoFuture for PendingOperation<T> {
    type Output = OperationResult<T>;
    type IntoFuture = OperationFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        OperationFuture {
            subscription: Subscription::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn immediate(value: Option<u32>, error: Option<EngineError>) -> PendingOperation<u32> {
        PendingOperation::new("test_op", move |completion| completion.complete(value, error))
    }

    #[test]
    fn callback_receives_value() {
        let (tx, rx) = mpsc::channel();
        immediate(Some(7), None).on_complete(move |r| tx.send(r).unwrap());
        assert_eq!(rx.recv().unwrap().unwrap(), 7);
    }

    #[test]
    fn callback_synthesizes_failure_for_empty_completion() {
        let (tx, rx) = mpsc::channel();
        immediate(None, None).on_complete(move |r| tx.send(r).unwrap());
        let err = rx.recv().unwrap().unwrap_err();
        assert!(matches!(
            err,
            SyncBridgeError::OperationFailed {
                operation: "test_op"
            }
        ));
    }

    #[test]
    fn error_wins_over_value() {
        let (tx, rx) = mpsc::channel();
        let error = EngineError::new(ErrorCategory::App, 3, "boom");
        immediate(Some(1), Some(error.clone())).on_complete(move |r| tx.send(r).unwrap());
        let err = rx.recv().unwrap().unwrap_err();
        assert_eq!(err.engine_error(), Some(&error));
    }

    #[test]
    fn dropped_completion_fails_operation() {
        let (tx, rx) = mpsc::channel();
        PendingOperation::<u32>::new("dropped", drop).on_complete(move |r| tx.send(r).unwrap());
        assert!(matches!(
            rx.recv().unwrap(),
            Err(SyncBridgeError::OperationFailed { operation: "dropped" })
        ));
    }

    #[test]
    fn nothing_starts_until_consumed() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        let op = PendingOperation::new("lazy", move |c: Completion<u32>| {
            counter.fetch_add(1, Ordering::SeqCst);
            c.succeed(1);
        });
        assert_eq!(started.load(Ordering::SeqCst), 0);
        op.on_complete(|_| {});
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn completion_from_another_thread() {
        let (tx, rx) = mpsc::channel();
        PendingOperation::new("threaded", |c: Completion<String>| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                c.succeed("done".to_string());
            });
        })
        .on_complete(move |r| tx.send(r).unwrap());

        let result = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(result.unwrap(), "done");
    }

    #[test]
    fn and_then_transforms_success() {
        let (tx, rx) = mpsc::channel();
        immediate(Some(20), None)
            .and_then(|n| Ok(n * 2))
            .on_complete(move |r| tx.send(r).unwrap());
        assert_eq!(rx.recv().unwrap().unwrap(), 40);
    }

    #[test]
    fn and_then_passes_errors_through() {
        let (tx, rx) = mpsc::channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        immediate(None, None)
            .and_then(move |n| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(n)
            })
            .on_complete(move |r| tx.send(r).unwrap());
        assert!(rx.recv().unwrap().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ready_operation() {
        let (tx, rx) = mpsc::channel();
        PendingOperation::ready("ready", Ok(5u8)).on_complete(move |r| tx.send(r).unwrap());
        assert_eq!(rx.recv().unwrap().unwrap(), 5);
    }

    #[test]
    fn void_completion_finish() {
        let (tx, rx) = mpsc::channel();
        PendingOperation::new("void", |c: Completion<()>| c.finish(None))
            .on_complete(move |r| tx.send(r).unwrap());
        assert!(rx.recv().unwrap().is_ok());
    }

    #[cfg(feature = "async")]
    #[test]
    fn future_resolves() {
        let result = futures::executor::block_on(immediate(Some(3), None).into_future());
        assert_eq!(result.unwrap(), 3);
    }

    #[cfg(feature = "async")]
    #[test]
    fn stream_yields_once_then_ends() {
        use futures::StreamExt;

        let mut stream = immediate(Some(9), None).into_stream();
        futures::executor::block_on(async {
            assert_eq!(stream.next().await.unwrap().unwrap(), 9);
            assert!(stream.next().await.is_none());
        });
        assert!(futures::stream::FusedStream::is_terminated(&stream));
    }

    #[cfg(feature = "async")]
    struct Tracked(Arc<AtomicUsize>);

    #[cfg(feature = "async")]
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[cfg(feature = "async")]
    type Held = Arc<Mutex<Option<Completion<Tracked>>>>;

    #[cfg(feature = "async")]
    fn held_operation() -> (PendingOperation<Tracked>, Held, Arc<AtomicUsize>) {
        let held: Held = Arc::new(Mutex::new(None));
        let starts = Arc::new(AtomicUsize::new(0));
        let (h, s) = (Arc::clone(&held), Arc::clone(&starts));
        let op = PendingOperation::new("held_op", move |completion| {
            s.fetch_add(1, Ordering::SeqCst);
            *h.lock() = Some(completion);
        });
        (op, held, starts)
    }

    #[cfg(feature = "async")]
    #[test]
    fn dropped_stream_discards_late_result() {
        use futures::Stream;

        let (op, held, starts) = held_operation();
        let mut stream = op.into_stream();
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        assert!(Pin::new(&mut stream).poll_next(&mut cx).is_pending());
        assert!(Pin::new(&mut stream).poll_next(&mut cx).is_pending());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        drop(stream);

        let drops = Arc::new(AtomicUsize::new(0));
        let completion = held.lock().take().unwrap();
        completion.succeed(Tracked(Arc::clone(&drops)));

        // The slot dropped the value instead of keeping it for a consumer.
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "async")]
    #[test]
    fn dropped_future_discards_late_result() {
        let (op, held, starts) = held_operation();
        let mut future = op.into_future();
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        assert!(Pin::new(&mut future).poll(&mut cx).is_pending());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        drop(future);

        let drops = Arc::new(AtomicUsize::new(0));
        let completion = held.lock().take().unwrap();
        completion.succeed(Tracked(Arc::clone(&drops)));

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "async")]
    #[test]
    fn unpolled_stream_never_starts() {
        let (op, held, starts) = held_operation();
        let stream = op.into_stream();
        drop(stream);
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        assert!(held.lock().is_none());
    }

    #[cfg(feature = "async")]
    #[test]
    fn polled_stream_receives_held_result() {
        let (op, held, _) = held_operation();
        let drops = Arc::new(AtomicUsize::new(0));
        let mut stream = op.into_stream();
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        assert!(futures::Stream::poll_next(Pin::new(&mut stream), &mut cx).is_pending());

        let completion = held.lock().take().unwrap();
        completion.succeed(Tracked(Arc::clone(&drops)));
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        match futures::Stream::poll_next(Pin::new(&mut stream), &mut cx) {
            Poll::Ready(Some(Ok(item))) => drop(item),
            _ => panic!("expected the held result"),
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
