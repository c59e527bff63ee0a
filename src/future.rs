use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::condition::Condition;
use crate::error::Error;
use crate::executor::ExecutorRef;
use crate::future_state::FutureState;
use crate::local_state::LocalState;
use crate::promise::Promise;
use crate::try_value::Try;

enum Inner<T: Send + 'static> {
    Shared(Arc<FutureState<T>>),
    Local(LocalState<T>),
}

/// The consumer side of a `Future`/[`Promise`] pair.
///
/// A future is consumed exactly once: by [`get`] (blocking), by a
/// then-chain, or by awaiting it inside a lazy task. Futures are move-only.
///
/// A future created from a value ([`make_ready_future`]) carries its result
/// inline and never touches an atomic.
///
/// [`get`]: Future::get
/// [`make_ready_future`]: make_ready_future
pub struct Future<T: Send + 'static> {
    inner: Inner<T>,
}

impl<T: Send + 'static> Future<T> {
    pub(crate) fn from_shared(state: Arc<FutureState<T>>) -> Self {
        Future {
            inner: Inner::Shared(state),
        }
    }

    pub(crate) fn from_try(value: Try<T>) -> Self {
        Future {
            inner: Inner::Local(LocalState::new(value)),
        }
    }

    /// Returns `true` if this handle is connected to a producer or already
    /// carries a result.
    pub fn valid(&self) -> bool {
        match &self.inner {
            Inner::Shared(_) => true,
            Inner::Local(local) => local.has_result(),
        }
    }

    /// Returns `true` once the producer has delivered a value or error.
    pub fn has_result(&self) -> bool {
        match &self.inner {
            Inner::Shared(state) => state.has_result(),
            Inner::Local(local) => local.has_result(),
        }
    }

    /// The executor continuations of this future prefer, if any.
    pub fn executor(&self) -> Option<ExecutorRef> {
        match &self.inner {
            Inner::Shared(state) => state.executor(),
            Inner::Local(local) => local.executor(),
        }
    }

    /// Makes continuations of this future prefer `executor`. The last call
    /// wins.
    pub fn via(self, executor: ExecutorRef) -> Self {
        match self.inner {
            Inner::Shared(state) => {
                state.set_executor(Some(executor));
                Future {
                    inner: Inner::Shared(state),
                }
            }
            Inner::Local(mut local) => {
                local.set_executor(Some(executor));
                Future {
                    inner: Inner::Local(local),
                }
            }
        }
    }

    /// Installs the one-shot continuation. For a ready future the callback
    /// runs immediately on the calling thread; otherwise it runs per the
    /// shared-state dispatch rules once the result arrives.
    pub(crate) fn set_continuation<F>(self, continuation: F)
    where
        F: FnOnce(Try<T>) + Send + 'static,
    {
        match self.inner {
            Inner::Shared(state) => state.set_continuation(continuation),
            Inner::Local(local) => local.set_continuation(continuation),
        }
    }

    /// Consumes the future and takes its result container.
    ///
    /// # Panics
    ///
    /// Panics if no result is present; check [`has_result`] first or use
    /// [`get`] to block.
    ///
    /// [`has_result`]: Future::has_result
    /// [`get`]: Future::get
    pub fn result(self) -> Try<T> {
        assert!(self.has_result(), "future is not ready");
        match self.inner {
            Inner::Shared(state) => state.take_result(),
            Inner::Local(local) => local.take_result(),
        }
    }

    /// Consumes the future and takes its value.
    ///
    /// # Panics
    ///
    /// Panics if no result is present, and re-raises a stored error.
    pub fn value(self) -> T {
        self.result().value_or_raise()
    }

    /// Blocks the calling native thread until the result arrives, then
    /// returns the value.
    ///
    /// # Panics
    ///
    /// Panics when called from a worker thread of this future's own
    /// executor — the continuation could then never run and the wait would
    /// deadlock. Also re-raises a stored error.
    pub fn get(self) -> T {
        if self.has_result() {
            return self.value();
        }
        if let Some(executor) = self.executor() {
            assert!(
                !executor.in_current_thread(),
                "future::get called from the future's own executor"
            );
        }
        let condition = Arc::new(Condition::new());
        let slot = Arc::new(Mutex::new(Try::Empty));
        {
            let condition = condition.clone();
            let slot = slot.clone();
            self.set_continuation(move |value| {
                *slot.lock().unwrap() = value;
                condition.release();
            });
        }
        condition.acquire();
        let value = std::mem::replace(&mut *slot.lock().unwrap(), Try::Empty);
        value.value_or_raise()
    }

    /// Chains a callback over the result container, producing the future of
    /// its return value. The callback runs whether the result is a value or
    /// an error; a panic inside it is captured into the downstream future.
    pub fn then_try<R, F>(self, func: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(Try<T>) -> R + Send + 'static,
    {
        let executor = self.executor();
        let mut promise = Promise::new();
        let mut future = promise.get_future();
        if let Some(executor) = executor {
            future = future.via(executor);
        }
        self.set_continuation(move |value| {
            match catch_unwind(AssertUnwindSafe(|| func(value))) {
                Ok(result) => promise.set_value(result),
                Err(payload) => promise.set_error(Error::Panic(payload)),
            }
        });
        future
    }

    /// Chains a callback over the value, skipping it (and propagating the
    /// error) when the result is an error.
    pub fn then_value<R, F>(self, func: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let executor = self.executor();
        let mut promise = Promise::new();
        let mut future = promise.get_future();
        if let Some(executor) = executor {
            future = future.via(executor);
        }
        self.set_continuation(move |value| match value {
            Try::Value(v) => match catch_unwind(AssertUnwindSafe(|| func(v))) {
                Ok(result) => promise.set_value(result),
                Err(payload) => promise.set_error(Error::Panic(payload)),
            },
            Try::Error(e) => promise.set_error(e),
            Try::Empty => unreachable!("continuation invoked without a result"),
        });
        future
    }
}

// Promise::set_value needs to move a Promise out of Future::then_* closures,
// which requires Promise: Send; that holds because FutureState<T>: Send for
// T: Send.

/// Creates a future that is ready with `value`.
pub fn make_ready_future<T: Send + 'static>(value: T) -> Future<T> {
    Future::from_try(Try::Value(value))
}

/// Creates a future that is ready with `error`.
pub fn make_error_future<T: Send + 'static>(error: Error) -> Future<T> {
    Future::from_try(Try::Error(error))
}

/// Collects the results of a batch of futures into the future of a vector,
/// index-matched to the inputs.
///
/// If every input already has a result the returned future is ready
/// synchronously. Otherwise each pending input gets a continuation that
/// drops its result into the matching slot; the last continuation to run
/// fulfills the aggregate promise from the shared context's drop glue.
/// Individual errors land in their slots — the aggregate itself never
/// fails.
pub fn collect_all_futures<T: Send + 'static>(futures: Vec<Future<T>>) -> Future<Vec<Try<T>>> {
    let n = futures.len();
    if futures.iter().all(|f| f.has_result()) {
        let results = futures.into_iter().map(|f| f.result()).collect();
        return make_ready_future(results);
    }

    struct Context<T: Send + 'static> {
        results: Mutex<Vec<Try<T>>>,
        promise: Mutex<Option<Promise<Vec<Try<T>>>>>,
    }

    impl<T: Send + 'static> Drop for Context<T> {
        fn drop(&mut self) {
            // Last continuation gone: every slot is filled.
            let results = std::mem::take(&mut *self.results.lock().unwrap());
            if let Some(promise) = self.promise.lock().unwrap().take() {
                promise.set_value(results);
            }
        }
    }

    let mut promise = Promise::new();
    let future = promise.get_future();
    let context = Arc::new(Context {
        results: Mutex::new((0..n).map(|_| Try::Empty).collect()),
        promise: Mutex::new(Some(promise)),
    });
    for (i, input) in futures.into_iter().enumerate() {
        if input.has_result() {
            context.results.lock().unwrap()[i] = input.result();
        } else {
            let context = context.clone();
            input.set_continuation(move |value| {
                context.results.lock().unwrap()[i] = value;
            });
        }
    }
    future
}
