//! Future/Promise pairs and lazy tasks for building executor-agnostic
//! async systems.
//!
//! This crate provides two cooperating primitives and the machinery to
//! compose them. A [`Promise`]/[`Future`] pair is an eagerly-executed
//! producer/consumer rendezvous for a single value. A [`Lazy`] is a
//! suspendable computation that does not run until awaited or launched,
//! and resumes on a pluggable [`Executor`].
//!
//! The crate never spawns threads for task execution; all concurrency
//! comes from the executor the application plugs in.
//!
//! # Lazy tasks
//!
//! Any future can become a lazy task:
//!
//! ```
//! use lazy_promise::{sync_await, Lazy};
//!
//! fn add(a: i32, b: i32) -> Lazy<i32> {
//!     Lazy::new(async move { a + b })
//! }
//!
//! fn sum() -> Lazy<i32> {
//!     Lazy::new(async {
//!         // Awaiting another lazy transfers control directly, with no
//!         // scheduler hop.
//!         add(1, 2).await + add(3, 4).await
//!     })
//! }
//!
//! assert_eq!(sync_await(sum()), 10);
//! ```
//!
//! A lazy is launched with [`Lazy::start`] (fire-and-forget with a
//! callback), blocked on with [`sync_await`], or pinned to an executor
//! first with [`Lazy::via`]. Errors are values: a panic inside the body is
//! captured into the [`Try`] observed by `try_await` and `start`, and
//! re-raised by a plain `.await`.
//!
//! # Futures and promises
//!
//! ```
//! use lazy_promise::Promise;
//!
//! let mut promise = Promise::new();
//! let future = promise.get_future();
//! // ... hand the promise to a producer thread ...
//! promise.set_value(42);
//! assert_eq!(future.get(), 42);
//! ```
//!
//! The shared state is lock-free on the fast path; whichever side arrives
//! last runs the continuation, preferring the executor recorded with
//! [`Future::via`] / [`Promise::checkout`].
//!
//! # Composition
//!
//! [`collect_all`] and friends coordinate batches of tasks through a
//! countdown rendezvous: output order matches input order, individual
//! errors stay in their slots, and the aggregate never fails. There is no
//! first-class cancellation; a timeout is `collect_any` of a [`sleep`] and
//! the work, with the loser running to completion and its result
//! discarded.
//!
//! # Blocking code
//!
//! The [`uthread`] module runs code that cannot be rewritten as a state
//! machine on cooperative stackful threads, bridged onto futures with
//! explicit context switches.

#![warn(missing_docs, rust_2018_idioms)]

mod awaiter;
mod collect;
mod condition;
mod condition_variable;
mod count_event;
mod current;
mod dispatch;
mod error;
mod executor;
mod future;
mod future_state;
mod header;
mod io_executor;
mod latch;
mod lazy;
mod local_state;
mod mutex;
mod promise;
mod raw;
mod runnable;
mod semaphore;
mod sleep;
mod spin_lock;
mod state;
mod sync_await;
mod try_value;
mod utils;
pub mod uthread;

pub use crate::awaiter::{
    ready_awaiter, resume_by_schedule, FutureAwaiter, ReadyAwaiter, ResumeByScheduleAwaiter,
};
pub use crate::collect::{
    collect_all, collect_all_para, collect_all_tuple, collect_all_tuple_para,
    collect_all_windowed, collect_all_windowed_para, collect_any, collect_any_pair,
    collect_any_with_callback, CollectAllAwaiter, CollectAnyAwaiter, CollectAnyCallbackAwaiter,
    CollectAnyPairAwaiter, CollectAnyResult, LazyTuple,
};
pub use crate::dispatch::{dispatch, DispatchAwaiter};
pub use crate::error::{Error, PanicPayload};
pub use crate::executor::{
    Executor, ExecutorRef, ExecutorStat, Func, Priority, SchedContext, ScheduleInfo,
    ScheduleOptions,
};
pub use crate::future::{collect_all_futures, make_error_future, make_ready_future, Future};
pub use crate::io_executor::{IoCallback, IoExecutor, IoSlice};
pub use crate::latch::Latch;
pub use crate::lazy::{
    current_executor, current_task_local, yield_now, Lazy, RescheduleLazy, StartableTask,
    TryAwaiter, ValueAwaiter, YieldAwaiter,
};
pub use crate::mutex::{LockFuture, Mutex, MutexGuard};
pub use crate::promise::Promise;
pub use crate::semaphore::CountingSemaphore;
pub use crate::sleep::{sleep, sleep_on, sleep_with_info};
pub use crate::spin_lock::{AsyncScopedLock, SpinLock, SpinLockGuard};
pub use crate::sync_await::{sync_await, sync_await_try, sync_await_via};
pub use crate::condition_variable::ConditionVariable;
pub use crate::try_value::Try;
