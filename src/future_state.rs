use core::cell::UnsafeCell;
use core::mem;
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::executor::{ExecutorRef, SchedContext, ScheduleOptions};
use crate::try_value::Try;

/// Phase of a shared state. Transitions are monotonic along one of two
/// paths, `START -> ONLY_RESULT -> DONE` or `START -> ONLY_CONTINUATION ->
/// DONE`, and `DONE` is terminal.
const START: u8 = 0;
const ONLY_RESULT: u8 = 1 << 0;
const ONLY_CONTINUATION: u8 = 1 << 1;
const DONE: u8 = 1 << 5;

type Continuation<T> = Box<dyn FnOnce(Try<T>) + Send + 'static>;

/// Scheduling preferences recorded by the producer side. The phase machine
/// itself is lock-free; these are written at most a handful of times before
/// the result arrives, so a plain mutex is fine.
struct SchedulePrefs {
    executor: Option<ExecutorRef>,
    context: SchedContext,
    force_schedule: bool,
}

/// The shared state between a `Future` and a `Promise`.
///
/// This is the single-slot rendezvous at the heart of the crate: one
/// producer writes one result, one consumer installs at most one
/// continuation, and whichever side arrives last dispatches the
/// continuation. Strong ownership is the `Arc` holding this value; the
/// producer and continuation counts are tracked separately because their
/// lifetimes end before the allocation's does.
///
/// Users never see this type.
pub(crate) struct FutureState<T> {
    phase: AtomicU8,
    /// Written once by the producer before the phase leaves `START`/
    /// `ONLY_CONTINUATION`; read once by the dispatching thread after it
    /// observes `DONE`.
    result: UnsafeCell<Try<T>>,
    /// Installed once by the consumer before the phase leaves `START`/
    /// `ONLY_RESULT`; taken by the dispatching thread or dropped when the
    /// continuation count hits zero.
    continuation: UnsafeCell<Option<Continuation<T>>>,
    continuation_ref: AtomicUsize,
    producer_ref: AtomicUsize,
    prefs: Mutex<SchedulePrefs>,
}

// SAFETY: the unsafe cells are only touched according to the phase
// protocol documented on the fields; every cross-thread access is ordered
// by the release/acquire phase CAS.
unsafe impl<T: Send> Send for FutureState<T> {}
unsafe impl<T: Send> Sync for FutureState<T> {}

impl<T: Send + 'static> FutureState<T> {
    pub(crate) fn new() -> Self {
        FutureState {
            phase: AtomicU8::new(START),
            result: UnsafeCell::new(Try::Empty),
            continuation: UnsafeCell::new(None),
            continuation_ref: AtomicUsize::new(0),
            producer_ref: AtomicUsize::new(0),
            prefs: Mutex::new(SchedulePrefs {
                executor: None,
                context: SchedContext::NONE,
                force_schedule: false,
            }),
        }
    }

    pub(crate) fn has_result(&self) -> bool {
        self.phase.load(Ordering::Acquire) & (ONLY_RESULT | DONE) != 0
    }

    pub(crate) fn has_continuation(&self) -> bool {
        self.phase.load(Ordering::Acquire) & (ONLY_CONTINUATION | DONE) != 0
    }

    pub(crate) fn attach_promise(&self) {
        self.producer_ref.fetch_add(1, Ordering::Relaxed);
    }

    /// Releases one producer reference. The last producer to leave without a
    /// result breaks the promise.
    pub(crate) fn detach_promise(self: &Arc<Self>) {
        let old = self.producer_ref.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old >= 1);
        if old == 1 && !self.has_result() {
            self.set_result(Try::Error(Error::BrokenPromise));
        }
    }

    pub(crate) fn set_executor(&self, executor: Option<ExecutorRef>) {
        self.prefs.lock().unwrap().executor = executor;
    }

    pub(crate) fn executor(&self) -> Option<ExecutorRef> {
        self.prefs.lock().unwrap().executor.clone()
    }

    /// Records the producer's current worker context so the continuation
    /// prefers the same worker.
    pub(crate) fn checkout(&self) {
        let mut prefs = self.prefs.lock().unwrap();
        if let Some(executor) = prefs.executor.clone() {
            prefs.context = executor.checkout();
        }
    }

    /// Forbids running the continuation on the phase-changing thread.
    /// Ignored when no executor is recorded, since there would be nowhere
    /// else to run it.
    pub(crate) fn set_force_schedule(&self, force: bool) {
        let mut prefs = self.prefs.lock().unwrap();
        if prefs.executor.is_none() && force {
            return;
        }
        prefs.force_schedule = force;
    }

    /// Takes the result out. Caller must have observed [`has_result`].
    ///
    /// [`has_result`]: FutureState::has_result
    pub(crate) fn take_result(&self) -> Try<T> {
        debug_assert!(self.has_result());
        // SAFETY: the result was written before the phase transition the
        // caller observed with acquire ordering, and the consumer side is
        // unique (move-only handle).
        unsafe { mem::replace(&mut *self.result.get(), Try::Empty) }
    }

    /// Stores the result and, if a continuation was already installed,
    /// dispatches it.
    ///
    /// # Panics
    ///
    /// Panics if a result was already set.
    pub(crate) fn set_result(self: &Arc<Self>, value: Try<T>) {
        assert!(!self.has_result(), "future state already has a result");
        // SAFETY: unique producer (asserted above); the write is published
        // by the release CAS below.
        unsafe {
            *self.result.get() = value;
        }
        let mut phase = self.phase.load(Ordering::Acquire);
        if phase == START {
            match self.phase.compare_exchange(
                START,
                ONLY_RESULT,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(current) => phase = current,
            }
        }
        if phase == ONLY_CONTINUATION {
            if self
                .phase
                .compare_exchange(
                    ONLY_CONTINUATION,
                    DONE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                self.dispatch_continuation(false);
                return;
            }
        }
        panic!("future state transfer error");
    }

    /// Installs the continuation and, if the result is already there,
    /// dispatches it.
    ///
    /// # Panics
    ///
    /// Panics if a continuation was already installed.
    pub(crate) fn set_continuation<F>(self: &Arc<Self>, continuation: F)
    where
        F: FnOnce(Try<T>) + Send + 'static,
    {
        assert!(
            !self.has_continuation(),
            "future state already has a continuation"
        );
        // SAFETY: unique consumer (asserted above); published by the
        // release CAS below.
        unsafe {
            *self.continuation.get() = Some(Box::new(continuation));
        }
        let mut phase = self.phase.load(Ordering::Acquire);
        if phase == START {
            match self.phase.compare_exchange(
                START,
                ONLY_CONTINUATION,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(current) => phase = current,
            }
        }
        if phase == ONLY_RESULT {
            if self
                .phase
                .compare_exchange(ONLY_RESULT, DONE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.dispatch_continuation(true);
                return;
            }
        }
        panic!("future state transfer error");
    }

    /// Runs or schedules the continuation. Called exactly once, by the
    /// thread whose CAS reached `DONE`.
    ///
    /// In-thread execution is preferred unless the producer asked for a
    /// scheduling hop (`force_schedule`) and one is possible. A refused
    /// submission falls back to in-thread execution; the aggregate machinery
    /// upstack tolerates continuations running on the producer's thread.
    fn dispatch_continuation(self: &Arc<Self>, triggered_by_continuation: bool) {
        debug_assert_eq!(self.phase.load(Ordering::Relaxed), DONE);
        let (executor, context, force_schedule) = {
            let prefs = self.prefs.lock().unwrap();
            (prefs.executor.clone(), prefs.context, prefs.force_schedule)
        };

        let run_inline = !force_schedule
            && (executor.is_none()
                || triggered_by_continuation
                || executor.as_ref().is_some_and(|e| e.in_current_thread()));
        if run_inline {
            // The guard keeps the state alive across the callback so nested
            // then-chains can still reach it.
            let guard = ContinuationRef::new(self.clone());
            guard.invoke();
            return;
        }

        let executor = executor.unwrap();
        let guard = ContinuationRef::new(self.clone());
        // The closure and the fallback path share one reference through
        // this cell so the continuation runs exactly once no matter which
        // side wins.
        let cell = Arc::new(Mutex::new(Some(guard)));
        let job = {
            let cell = cell.clone();
            Box::new(move || {
                let guard = cell.lock().unwrap().take();
                if let Some(guard) = guard {
                    guard.invoke();
                }
            })
        };
        let submitted = if context.is_none() {
            executor.schedule(job)
        } else {
            let opts = ScheduleOptions {
                prompt: !force_schedule,
            };
            executor.checkin(job, context, opts)
        };
        if !submitted {
            if let Some(guard) = cell.lock().unwrap().take() {
                guard.invoke();
            }
        }
    }

    fn ref_continuation(&self) {
        self.continuation_ref.fetch_add(1, Ordering::Relaxed);
    }

    fn deref_continuation(&self) {
        let old = self.continuation_ref.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old >= 1);
        if old == 1 {
            // SAFETY: last continuation reference; nobody else can reach the
            // slot anymore.
            unsafe {
                (*self.continuation.get()).take();
            }
        }
    }
}

/// Guard pairing a strong reference with a continuation reference; the
/// continuation callback is destroyed when the last guard drops, which may
/// happen before or after the last strong reference goes away.
struct ContinuationRef<T: Send + 'static> {
    state: Arc<FutureState<T>>,
}

impl<T: Send + 'static> ContinuationRef<T> {
    fn new(state: Arc<FutureState<T>>) -> Self {
        state.ref_continuation();
        ContinuationRef { state }
    }

    /// Invokes the continuation with the stored result.
    fn invoke(&self) {
        // SAFETY: only the DONE-reaching thread constructs invoking guards,
        // and it does so once; the result/continuation writes happened
        // before the acquire CAS that got us here.
        let (continuation, value) = unsafe {
            (
                (*self.state.continuation.get()).take(),
                mem::replace(&mut *self.state.result.get(), Try::Empty),
            )
        };
        if let Some(continuation) = continuation {
            continuation(value);
        }
    }
}

impl<T: Send + 'static> Drop for ContinuationRef<T> {
    fn drop(&mut self) {
        self.state.deref_continuation();
    }
}
