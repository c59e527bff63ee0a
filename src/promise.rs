use std::sync::Arc;

use crate::error::Error;
use crate::future::Future;
use crate::future_state::FutureState;
use crate::try_value::Try;

/// The producer side of a [`Future`]/`Promise` pair.
///
/// A promise hands out exactly one [`Future`] and sets exactly one result.
/// Dropping a promise that never produced a result breaks it: the consumer
/// observes [`Error::BrokenPromise`].
///
/// Promises are move-only. The handle can live on a different thread than
/// its future; the shared state underneath is thread-safe.
///
/// # Examples
///
/// ```
/// use lazy_promise::Promise;
///
/// let mut promise = Promise::new();
/// let future = promise.get_future();
/// promise.set_value(42);
/// assert_eq!(future.get(), 42);
/// ```
pub struct Promise<T: Send + 'static> {
    state: Option<Arc<FutureState<T>>>,
    has_future: bool,
}

impl<T: Send + 'static> Promise<T> {
    /// Creates a promise with a fresh shared state.
    pub fn new() -> Self {
        let state = Arc::new(FutureState::new());
        state.attach_promise();
        Promise {
            state: Some(state),
            has_future: false,
        }
    }

    /// Returns `false` for a moved-from or consumed promise.
    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    /// Hands out the consumer side.
    ///
    /// # Panics
    ///
    /// Panics on a second call, or on an invalid promise.
    pub fn get_future(&mut self) -> Future<T> {
        let state = self.state.as_ref().expect("promise is broken");
        assert!(!self.has_future, "promise already has a future");
        self.has_future = true;
        Future::from_shared(state.clone())
    }

    /// Records the producer's current worker context so the continuation,
    /// if it ends up scheduled, prefers the same worker.
    pub fn checkout(&mut self) -> &mut Self {
        if let Some(state) = &self.state {
            state.checkout();
        }
        self
    }

    /// Forbids running the continuation on the thread that sets the result.
    pub fn force_schedule(&mut self) -> &mut Self {
        if let Some(state) = &self.state {
            state.set_force_schedule(true);
        }
        self
    }

    /// Fulfills the promise with a value.
    pub fn set_value(self, value: T) {
        self.set_result(Try::Value(value));
    }

    /// Fails the promise with an error.
    pub fn set_error(self, error: Error) {
        self.set_result(Try::Error(error));
    }

    /// Fulfills the promise with an already-wrapped result.
    pub fn set_result(mut self, result: Try<T>) {
        let state = self.state.take().expect("promise is broken");
        state.set_result(result);
        state.detach_promise();
    }
}

impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Promise::new()
    }
}

impl<T: Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.detach_promise();
        }
    }
}
