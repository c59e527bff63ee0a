//! The ambient context of the task chain being polled.
//!
//! Every root task owns a *chain handle*: the executor (and checked-out
//! worker context) shared by the whole chain of awaits hanging off that
//! root. While the root driver polls, a thread-local frame exposes the
//! chain handle and the innermost task-local value, so suspension points
//! (`yield_now`, `dispatch`, `sleep`, the future awaiter) can find their
//! executor without it being threaded through every call.
//!
//! The frame is saved and restored around every nested poll, so concurrent
//! chains on one thread and re-entrant polling both behave.

use core::any::Any;
use core::cell::RefCell;

use std::sync::{Arc, Mutex};

use crate::executor::{ExecutorRef, Func, SchedContext, ScheduleInfo, ScheduleOptions};
use crate::runnable::Runnable;

/// A type-erased task-local record. Lookups downcast by type id, which is
/// the unique tag the contract asks for.
pub(crate) type LocalValue = Arc<dyn Any + Send + Sync>;

struct ChainState {
    executor: Option<ExecutorRef>,
    context: SchedContext,
}

/// Shared executor slot of one root task's await chain.
///
/// All resumption of the chain funnels through [`submit`], so swapping the
/// executor here migrates the current task *and* every waiting ancestor in
/// one store — this is the explicit continuation-chain walk behind
/// `dispatch`.
///
/// [`submit`]: ChainHandle::submit
#[derive(Clone)]
pub(crate) struct ChainHandle {
    inner: Arc<Mutex<ChainState>>,
}

impl ChainHandle {
    pub(crate) fn new(executor: Option<ExecutorRef>) -> Self {
        ChainHandle {
            inner: Arc::new(Mutex::new(ChainState {
                executor,
                context: SchedContext::NONE,
            })),
        }
    }

    pub(crate) fn executor(&self) -> Option<ExecutorRef> {
        self.inner.lock().unwrap().executor.clone()
    }

    /// Swaps the chain's executor, invalidating any checked-out context.
    /// Returns the previous executor so a failed dispatch can roll back.
    pub(crate) fn swap_executor(&self, executor: Option<ExecutorRef>) -> Option<ExecutorRef> {
        let mut state = self.inner.lock().unwrap();
        state.context = SchedContext::NONE;
        core::mem::replace(&mut state.executor, executor)
    }

    /// Records the worker the chain last ran on, so the next submission can
    /// prefer it.
    pub(crate) fn checkout(&self) {
        let mut state = self.inner.lock().unwrap();
        if let Some(executor) = state.executor.clone() {
            state.context = executor.checkout();
        }
    }

    /// Resumes the chain: submits `runnable` through the chain's executor,
    /// or runs it on the calling thread when there is none. A refused
    /// submission degrades to running in place.
    pub(crate) fn submit(&self, runnable: Runnable, info: ScheduleInfo) {
        let (executor, context) = {
            let state = self.inner.lock().unwrap();
            (state.executor.clone(), state.context)
        };
        let executor = match executor {
            Some(executor) => executor,
            None => {
                runnable.run();
                return;
            }
        };
        // The submitted job and the refusal fallback share the runnable
        // through this cell so it runs exactly once either way.
        let cell = Arc::new(Mutex::new(Some(runnable)));
        let job: Func = {
            let cell = cell.clone();
            Box::new(move || {
                let runnable = cell.lock().unwrap().take();
                if let Some(runnable) = runnable {
                    runnable.run();
                }
            })
        };
        let submitted = if context.is_none() {
            executor.schedule_with_info(job, info)
        } else {
            executor.checkin(job, context, ScheduleOptions::default())
        };
        if !submitted {
            if let Some(runnable) = cell.lock().unwrap().take() {
                runnable.run();
            }
        }
    }
}

struct CurrentFrame {
    chain: ChainHandle,
    local: Option<LocalValue>,
}

thread_local! {
    static CURRENT: RefCell<Option<CurrentFrame>> = const { RefCell::new(None) };
}

/// Runs `f` with the given chain frame installed, restoring the previous
/// frame afterwards (also on unwind).
pub(crate) fn with_frame<R>(
    chain: &ChainHandle,
    local: Option<&LocalValue>,
    f: impl FnOnce() -> R,
) -> R {
    let frame = CurrentFrame {
        chain: chain.clone(),
        local: local.cloned(),
    };
    let prev = CURRENT.with(|current| current.replace(Some(frame)));
    let _restore = CallOnDrop(Some(move || {
        CURRENT.with(|current| *current.borrow_mut() = prev);
    }));
    f()
}

/// The chain handle of the task being polled on this thread, if any.
pub(crate) fn current_chain() -> Option<ChainHandle> {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .map(|frame| frame.chain.clone())
    })
}

/// The innermost task-local of the task being polled on this thread.
pub(crate) fn current_local() -> Option<LocalValue> {
    CURRENT.with(|current| current.borrow().as_ref().and_then(|f| f.local.clone()))
}

struct CallOnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for CallOnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}
