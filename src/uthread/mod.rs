//! Stackful cooperative threads bridged onto futures.
//!
//! A [`Uthread`] runs ordinary blocking-style code that cannot be rewritten
//! as a suspendable task, and cooperates with the rest of the crate through
//! explicit context switches: [`await_future`] checks the current uthread
//! out until a future's result arrives, then checks it back in, preferring
//! the executor worker it left.

mod context;

use core::sync::atomic::{AtomicBool, Ordering};

use std::sync::{Arc, Mutex};

pub use context::default_stack_size;
use context::{current_context, ThreadContext};

use crate::executor::ExecutorRef;
use crate::future::Future;
use crate::promise::Promise;
use crate::try_value::Try;

/// Construction parameters of a [`Uthread`].
#[derive(Clone, Default)]
pub struct Attribute {
    /// Executor completions and joins prefer. Required by the `Schedule`
    /// launch policy.
    pub executor: Option<ExecutorRef>,
    /// Stack size in bytes; 0 means the process default (see
    /// [`default_stack_size`]).
    pub stack_size: usize,
}

impl Attribute {
    fn resolved_stack_size(&self) -> usize {
        if self.stack_size == 0 {
            default_stack_size()
        } else {
            self.stack_size
        }
    }
}

/// Launch policy of [`spawn`] and [`collect_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// Construct and run inline on the current thread, returning the
    /// handle to the caller.
    Prompt,
    /// Submit construction to the executor.
    Schedule,
    /// Construct and detach on the current thread.
    Current,
}

/// A cooperative stackful thread: a dedicated stack plus a function,
/// switched in and out by explicit context switches.
///
/// Constructing a uthread runs the function immediately, up to its first
/// switch-out (typically inside [`await_future`]). Use [`join`] to be
/// notified when it finishes, or [`detach`] to let it run free.
///
/// [`join`]: Uthread::join
/// [`detach`]: Uthread::detach
pub struct Uthread {
    attr: Attribute,
    ctx: Option<Arc<ThreadContext>>,
}

impl Uthread {
    /// Creates the uthread and runs `func` until its first switch-out.
    pub fn new(attr: Attribute, func: impl FnOnce() + Send + 'static) -> Self {
        let ctx = ThreadContext::spawn(func, attr.resolved_stack_size());
        ctx.switch_in();
        Uthread {
            attr,
            ctx: Some(ctx),
        }
    }

    /// Registers a callback invoked when the uthread finishes. Returns
    /// `false` if it was already joined.
    ///
    /// With an executor in the attribute the callback is scheduled there
    /// (and the uthread is kept alive until it runs); without one it runs
    /// on whichever thread finishes the uthread.
    pub fn join<C>(mut self, callback: C) -> bool
    where
        C: FnOnce() + Send + 'static,
    {
        let ctx = match self.ctx.take() {
            Some(ctx) => ctx,
            None => return false,
        };
        if ctx.joined.swap(true, Ordering::AcqRel) {
            return false;
        }
        let future = ctx
            .done
            .lock()
            .unwrap()
            .take()
            .expect("uthread done future consumed without join");
        let future = match &self.attr.executor {
            Some(executor) => future.via(executor.clone()),
            None => future,
        };
        if future.has_result() {
            callback();
            return true;
        }
        match &self.attr.executor {
            None => {
                // Without an executor the uthread's life cannot be
                // extended past its function; run the callback wherever
                // completion happens.
                future.set_continuation(move |_| callback());
            }
            Some(_) => {
                {
                    let mut promise = ctx.promise.lock().unwrap();
                    if let Some(promise) = promise.as_mut() {
                        promise.force_schedule();
                        promise.checkout();
                    }
                }
                let keep_alive = ctx.clone();
                future.set_continuation(move |_| {
                    let _keep_alive = keep_alive;
                    callback();
                });
            }
        }
        true
    }

    /// Lets the uthread run to completion unobserved.
    pub fn detach(self) {
        self.join(|| {});
    }
}

/// Launches `func` on a fresh uthread per `policy` and returns the future
/// of its result.
///
/// The future prefers the attribute's executor; completions force a
/// scheduling hop so the producer's thread is never stolen.
///
/// # Panics
///
/// Panics for [`Launch::Prompt`] (use [`Uthread::new`] to keep the handle)
/// and for [`Launch::Schedule`] without an executor.
pub fn spawn<F, R>(policy: Launch, attr: Attribute, func: F) -> Future<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let mut promise = Promise::new();
    let mut result = promise.get_future();
    if let Some(executor) = &attr.executor {
        result = result.via(executor.clone());
    }
    let has_executor = attr.executor.is_some();
    let proc = move || {
        let mut promise = promise;
        if has_executor {
            promise.force_schedule();
            promise.checkout();
        }
        promise.set_value(func());
    };
    match policy {
        Launch::Schedule => {
            let executor = attr
                .executor
                .clone()
                .expect("Schedule launch requires an executor");
            let cell = Arc::new(Mutex::new(Some((attr, proc))));
            let job = {
                let cell = cell.clone();
                Box::new(move || {
                    if let Some((attr, proc)) = cell.lock().unwrap().take() {
                        Uthread::new(attr, proc).detach();
                    }
                })
            };
            if !executor.schedule(job) {
                if let Some((attr, proc)) = cell.lock().unwrap().take() {
                    Uthread::new(attr, proc).detach();
                }
            }
        }
        Launch::Current => {
            Uthread::new(attr, proc).detach();
        }
        Launch::Prompt => panic!("spawn does not support the Prompt policy"),
    }
    result
}

/// Blocks the current uthread (not its thread pool) until `future` has a
/// result, and returns the value.
///
/// The uthread is checked out; a continuation checks it back in when the
/// result arrives, and the loop tolerates spurious switch-ins. Must be
/// called inside a uthread, on a future that has an executor.
pub fn await_future<T: Send + 'static>(future: Future<T>) -> T {
    assert!(future.valid(), "future is broken");
    if future.has_result() {
        return future.value();
    }
    let executor = future
        .executor()
        .expect("await_future needs a future with an executor");
    let ctx = current_context().expect("await_future is only allowed inside a uthread");

    let mut bridge = Promise::<bool>::new();
    let resumed = bridge.get_future().via(executor);
    bridge.force_schedule();
    bridge.checkout();

    let slot = Arc::new(Mutex::new(Try::Empty));
    let done = Arc::new(AtomicBool::new(false));
    {
        let ctx = ctx.clone();
        resumed.set_continuation(move |_| ctx.switch_in());
    }
    {
        let slot = slot.clone();
        let done = done.clone();
        future.set_continuation(move |value| {
            *slot.lock().unwrap() = value;
            done.store(true, Ordering::Release);
            bridge.set_value(true);
        });
    }
    while !done.load(Ordering::Acquire) {
        ctx.switch_out();
    }
    let value = std::mem::replace(&mut *slot.lock().unwrap(), Try::Empty);
    value.value_or_raise()
}

/// Runs one uthread per function and waits for all of them, returning
/// their results in input order.
///
/// The current uthread is checked out until the last one finishes (the
/// shared context's drop glue fulfills the rendezvous promise). Must be
/// called inside a uthread; `Prompt` is not a valid policy here.
pub fn collect_all<F, R>(funcs: Vec<F>, executor: ExecutorRef, policy: Launch) -> Vec<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    assert!(
        policy != Launch::Prompt,
        "collect_all does not support the Prompt policy"
    );
    if funcs.is_empty() {
        return Vec::new();
    }
    let n = funcs.len();

    struct Context<R: Send + 'static> {
        slots: Vec<Mutex<Option<R>>>,
        promise: Mutex<Option<Promise<Vec<R>>>>,
    }

    impl<R: Send + 'static> Drop for Context<R> {
        fn drop(&mut self) {
            // Last uthread done: every slot is filled.
            let slots = std::mem::take(&mut self.slots);
            let results = slots
                .into_iter()
                .map(|slot| {
                    slot.into_inner()
                        .unwrap()
                        .expect("uthread finished without a result")
                })
                .collect();
            if let Some(promise) = self.promise.lock().unwrap().take() {
                promise.set_value(results);
            }
        }
    }

    let mut promise = Promise::new();
    let rendezvous = promise.get_future().via(executor.clone());
    promise.force_schedule();
    promise.checkout();
    let ctx = Arc::new(Context {
        slots: (0..n).map(|_| Mutex::new(None)).collect(),
        promise: Mutex::new(Some(promise)),
    });

    for (i, func) in funcs.into_iter().enumerate() {
        let ctx = ctx.clone();
        let job = move || {
            let result = func();
            *ctx.slots[i].lock().unwrap() = Some(result);
        };
        let attr = Attribute {
            executor: Some(executor.clone()),
            stack_size: 0,
        };
        match policy {
            Launch::Schedule => {
                let cell = Arc::new(Mutex::new(Some((attr, job))));
                let submit = {
                    let cell = cell.clone();
                    Box::new(move || {
                        if let Some((attr, job)) = cell.lock().unwrap().take() {
                            Uthread::new(attr, job).detach();
                        }
                    })
                };
                if !executor.schedule(submit) {
                    if let Some((attr, job)) = cell.lock().unwrap().take() {
                        Uthread::new(attr, job).detach();
                    }
                }
            }
            Launch::Current => {
                Uthread::new(attr, job).detach();
            }
            Launch::Prompt => unreachable!(),
        }
    }
    drop(ctx);

    await_future(rendezvous)
}
