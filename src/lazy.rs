use core::future::{Future as CoreFuture, IntoFuture};
use core::pin::Pin;
use core::task::{Context, Poll};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::current::{current_chain, current_local, with_frame, ChainHandle, LocalValue};
use crate::error::Error;
use crate::executor::{ExecutorRef, Priority, ScheduleInfo};
use crate::runnable::spawn_root;
use crate::try_value::Try;

/// A lazy task: a suspendable computation that does not run until it is
/// awaited or explicitly launched.
///
/// A `Lazy<T>` wraps a future producing `T` together with two slots: the
/// executor the task resumes on, and an optional task-local value carried
/// down the chain of awaits. Awaiting a lazy inside another lazy transfers
/// control directly — no scheduler hop — and the child joins the caller's
/// resumption chain, so the whole chain hops executors together.
///
/// To run a lazy from non-async code, use [`start`] (fire-and-forget with a
/// callback) or [`sync_await`] (block the calling thread). To pin it to an
/// executor first, use [`via`].
///
/// ```
/// use lazy_promise::{sync_await, Lazy};
///
/// fn forty_two() -> Lazy<i32> {
///     Lazy::new(async { 42 })
/// }
///
/// fn double() -> Lazy<i32> {
///     Lazy::new(async { forty_two().await * 2 })
/// }
///
/// assert_eq!(sync_await(double()), 84);
/// ```
///
/// Errors are values: a panic inside the task body is captured into the
/// [`Try`] seen by `try_await`/`start`, and re-raised by a plain `.await`.
///
/// [`start`]: Lazy::start
/// [`via`]: Lazy::via
/// [`sync_await`]: crate::sync_await
#[must_use = "a lazy task does nothing until awaited or started"]
pub struct Lazy<T> {
    future: Pin<Box<dyn CoreFuture<Output = T> + Send + 'static>>,
    executor: Option<ExecutorRef>,
    local: Option<LocalValue>,
}

impl<T: Send + 'static> Lazy<T> {
    /// Wraps a future into a lazy task.
    pub fn new<F>(future: F) -> Self
    where
        F: CoreFuture<Output = T> + Send + 'static,
    {
        Lazy {
            future: Box::pin(future),
            executor: None,
            local: None,
        }
    }

    /// The executor this task would be launched on, if any.
    pub fn executor(&self) -> Option<ExecutorRef> {
        self.executor.clone()
    }

    pub(crate) fn set_executor(&mut self, executor: Option<ExecutorRef>) {
        self.executor = executor;
    }

    /// Attaches a task-local value, visible to this task and everything it
    /// awaits via [`current_task_local`].
    ///
    /// # Panics
    ///
    /// Panics if a task-local is already attached.
    pub fn with_local<L>(mut self, value: L) -> Self
    where
        L: Send + Sync + 'static,
    {
        assert!(
            self.local.is_none(),
            "lazy task already carries a task-local"
        );
        self.local = Some(Arc::new(value));
        self
    }

    /// Binds an executor, turning this task into a [`RescheduleLazy`] whose
    /// launch always goes through `schedule`.
    pub fn via(mut self, executor: ExecutorRef) -> RescheduleLazy<T> {
        self.executor = Some(executor);
        RescheduleLazy { inner: self }
    }

    /// Awaits the task without rethrowing: the output is the [`Try`]
    /// carrying either the value or the captured error.
    pub fn try_await(self) -> TryAwaiter<T> {
        TryAwaiter {
            inner: AwaitInner::new(self),
        }
    }

    /// Launches the task as a detached root computation. `callback` is
    /// invoked exactly once with the task's result.
    ///
    /// The task begins executing on the calling thread and resumes on its
    /// executor (or the waking thread, if it has none).
    pub fn start<F>(self, callback: F)
    where
        F: FnOnce(Try<T>) + Send + 'static,
    {
        let chain = ChainHandle::new(self.executor.clone());
        let root = async move { callback(self.try_await().await) };
        spawn_root(root, chain).run();
    }

    /// Binds an executor and launches without an initial reschedule: the
    /// first resume happens on the calling thread, later ones on
    /// `executor`.
    pub fn directly_start<F>(mut self, callback: F, executor: ExecutorRef)
    where
        F: FnOnce(Try<T>) + Send + 'static,
    {
        self.executor = Some(executor);
        self.start(callback);
    }
}

impl<T: Send + 'static> IntoFuture for Lazy<T> {
    type Output = T;
    type IntoFuture = ValueAwaiter<T>;

    fn into_future(self) -> ValueAwaiter<T> {
        ValueAwaiter {
            inner: AwaitInner::new(self),
        }
    }
}

/// A [`Lazy`] bound to an executor.
///
/// Identical to `Lazy` except for the launch path: the first resume is
/// submitted through `schedule` instead of running on the calling thread.
/// Obtained from [`Lazy::via`]; there is no other way to construct one, so
/// the executor is always present.
#[must_use = "a lazy task does nothing until started"]
pub struct RescheduleLazy<T> {
    inner: Lazy<T>,
}

impl<T: Send + 'static> RescheduleLazy<T> {
    /// The bound executor.
    pub fn executor(&self) -> ExecutorRef {
        self.inner.executor.clone().expect("reschedule lazy without executor")
    }

    /// Launches the task through its executor. `callback` is invoked
    /// exactly once with the result.
    pub fn start<F>(self, callback: F)
    where
        F: FnOnce(Try<T>) + Send + 'static,
    {
        let chain = ChainHandle::new(self.inner.executor.clone());
        let lazy = self.inner;
        let root = async move { callback(lazy.try_await().await) };
        spawn_root(root, chain).schedule(ScheduleInfo::default());
    }

    /// Launches the task, re-raising any error on the worker that observes
    /// it.
    pub fn detach(self) {
        self.start(|result| {
            if let Try::Error(error) = result {
                error.rethrow();
            }
        });
    }
}

/// Either flavor of launchable task; lets [`sync_await`] accept both.
///
/// [`sync_await`]: crate::sync_await
pub trait StartableTask<T>: sealed::Sealed {
    /// The executor the launch would use, if any.
    fn task_executor(&self) -> Option<ExecutorRef>;

    /// Launches the task with a boxed callback.
    fn start_boxed(self, callback: Box<dyn FnOnce(Try<T>) + Send + 'static>);
}

impl<T: Send + 'static> StartableTask<T> for Lazy<T> {
    fn task_executor(&self) -> Option<ExecutorRef> {
        self.executor.clone()
    }

    fn start_boxed(self, callback: Box<dyn FnOnce(Try<T>) + Send + 'static>) {
        self.start(callback);
    }
}

impl<T: Send + 'static> StartableTask<T> for RescheduleLazy<T> {
    fn task_executor(&self) -> Option<ExecutorRef> {
        self.inner.executor.clone()
    }

    fn start_boxed(self, callback: Box<dyn FnOnce(Try<T>) + Send + 'static>) {
        self.start(callback);
    }
}

mod sealed {
    pub trait Sealed {}
    impl<T> Sealed for super::Lazy<T> {}
    impl<T> Sealed for super::RescheduleLazy<T> {}
}

/// Shared poll logic of the two lazy awaiters: resolves task-local
/// inheritance on first poll, then polls the child inside a chain frame.
struct AwaitInner<T> {
    future: Pin<Box<dyn CoreFuture<Output = T> + Send + 'static>>,
    executor: Option<ExecutorRef>,
    local: Option<LocalValue>,
    inherited: bool,
}

impl<T: Send + 'static> AwaitInner<T> {
    fn new(lazy: Lazy<T>) -> Self {
        AwaitInner {
            future: lazy.future,
            executor: lazy.executor,
            local: lazy.local,
            inherited: false,
        }
    }

    fn poll_inner(&mut self, cx: &mut Context<'_>) -> Poll<T> {
        if !self.inherited {
            // Task-locals flow downward exactly once. A task that carries
            // its own local may not be awaited from a task that also
            // carries one.
            let ambient = current_local();
            if self.local.is_some() {
                assert!(
                    ambient.is_none(),
                    "conflicting task-local: awaited task already carries one"
                );
            } else {
                self.local = ambient;
            }
            self.inherited = true;
        }
        // Awaited inline, the child joins the caller's chain. Polled as a
        // plain future (no surrounding lazy), it gets a chain of its own,
        // seeded with its executor slot.
        let chain = current_chain()
            .unwrap_or_else(|| ChainHandle::new(self.executor.clone()));
        let local = self.local.clone();
        let future = &mut self.future;
        with_frame(&chain, local.as_ref(), || future.as_mut().poll(cx))
    }
}

/// Awaiter of a consuming `.await`: yields `T`, re-raising captured errors.
pub struct ValueAwaiter<T> {
    inner: AwaitInner<T>,
}

impl<T: Send + 'static> CoreFuture for ValueAwaiter<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        // Fields are boxed or plain; nothing here relies on being pinned.
        self.get_mut().inner.poll_inner(cx)
    }
}

/// Awaiter of [`Lazy::try_await`]: yields the result container, capturing
/// panics from the task body.
pub struct TryAwaiter<T> {
    inner: AwaitInner<T>,
}

impl<T: Send + 'static> CoreFuture for TryAwaiter<T> {
    type Output = Try<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Try<T>> {
        let inner = &mut self.get_mut().inner;
        match catch_unwind(AssertUnwindSafe(|| inner.poll_inner(cx))) {
            Ok(Poll::Ready(value)) => Poll::Ready(Try::Value(value)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Try::Error(Error::Panic(payload))),
        }
    }
}

/// Suspends the running task and resubmits it to its executor at
/// [`Priority::Yield`], letting queued work run first.
///
/// # Panics
///
/// Panics when the current task has no executor — yielding is only
/// meaningful with one.
pub fn yield_now() -> YieldAwaiter {
    YieldAwaiter { yielded: false }
}

/// Awaiter returned by [`yield_now`].
pub struct YieldAwaiter {
    yielded: bool,
}

impl CoreFuture for YieldAwaiter {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.yielded {
            return Poll::Ready(());
        }
        this.yielded = true;
        let executor = current_chain()
            .and_then(|chain| chain.executor())
            .expect("yielding is only meaningful with an executor");
        let waker = cx.waker().clone();
        let submitted = executor.schedule_with_info(
            Box::new(move || waker.wake()),
            ScheduleInfo::with_priority(Priority::Yield),
        );
        if !submitted {
            // Refused submission degrades to an immediate re-poll.
            cx.waker().wake_by_ref();
        }
        Poll::Pending
    }
}

/// The executor of the task being polled, or `None` outside any executor.
pub async fn current_executor() -> Option<ExecutorRef> {
    current_chain().and_then(|chain| chain.executor())
}

/// The task-local of type `L` carried by the current await chain, or `None`
/// when absent or of a different type.
pub async fn current_task_local<L>() -> Option<Arc<L>>
where
    L: Send + Sync + 'static,
{
    current_local().and_then(|value| value.downcast::<L>().ok())
}
