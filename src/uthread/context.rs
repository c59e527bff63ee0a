//! The context-switch primitive behind [`Uthread`].
//!
//! Each context owns a dedicated OS thread created with the configured
//! stack size. `switch_in`/`switch_out` are a strict turn-based handshake:
//! exactly one of {caller, context} runs at any time, which is the contract
//! of a stackful jump without the assembly. The thread parks whenever it is
//! not the context's turn.
//!
//! The current context is tracked in a thread-local on the context's own
//! thread — set on entry, cleared on exit — so `switch_out` can identify
//! its caller.
//!
//! [`Uthread`]: super::Uthread

use core::cell::RefCell;
use core::sync::atomic::AtomicBool;

use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread;

use crate::future::Future;
use crate::promise::Promise;

const DEFAULT_STACK_SIZE: usize = 512 * 1024;

static STACK_SIZE: OnceLock<usize> = OnceLock::new();

/// The default stack size of a context, in bytes: the value of
/// `UTHREAD_STACK_SIZE_KB` (in KiB) or 512 KiB. Read once and cached.
pub fn default_stack_size() -> usize {
    *STACK_SIZE.get_or_init(|| {
        std::env::var("UTHREAD_STACK_SIZE_KB")
            .ok()
            .and_then(|kb| kb.parse::<usize>().ok())
            .filter(|kb| *kb > 0)
            .map(|kb| kb * 1024)
            .unwrap_or(DEFAULT_STACK_SIZE)
    })
}

#[derive(PartialEq)]
enum Turn {
    Caller,
    Context,
    Finished,
}

pub(crate) struct ThreadContext {
    turn: Mutex<Turn>,
    cvar: Condvar,
    pub(crate) joined: AtomicBool,
    /// Producer side of the completion rendezvous; consumed when the
    /// context's function returns.
    pub(crate) promise: Mutex<Option<Promise<bool>>>,
    /// Consumer side; taken by `join`.
    pub(crate) done: Mutex<Option<Future<bool>>>,
}

thread_local! {
    static CURRENT_UTHREAD: RefCell<Option<Arc<ThreadContext>>> = const { RefCell::new(None) };
}

/// The context whose thread we are on, if any.
pub(crate) fn current_context() -> Option<Arc<ThreadContext>> {
    CURRENT_UTHREAD.with(|current| current.borrow().clone())
}

impl ThreadContext {
    /// Creates the context and its thread. The thread parks until the
    /// first `switch_in`.
    pub(crate) fn spawn(
        func: impl FnOnce() + Send + 'static,
        stack_size: usize,
    ) -> Arc<ThreadContext> {
        let mut promise = Promise::new();
        let done = promise.get_future();
        let ctx = Arc::new(ThreadContext {
            turn: Mutex::new(Turn::Caller),
            cvar: Condvar::new(),
            joined: AtomicBool::new(false),
            promise: Mutex::new(Some(promise)),
            done: Mutex::new(Some(done)),
        });
        let thread_ctx = ctx.clone();
        thread::Builder::new()
            .name("uthread".into())
            .stack_size(stack_size)
            .spawn(move || {
                CURRENT_UTHREAD.with(|current| {
                    *current.borrow_mut() = Some(thread_ctx.clone());
                });
                thread_ctx.wait_initial();
                func();
                let promise = thread_ctx.promise.lock().unwrap().take();
                if let Some(promise) = promise {
                    promise.set_value(true);
                }
                CURRENT_UTHREAD.with(|current| {
                    *current.borrow_mut() = None;
                });
                thread_ctx.finish();
            })
            .expect("failed to spawn uthread context");
        ctx
    }

    /// Jumps into the context: the calling thread blocks until the context
    /// switches out again or finishes.
    pub(crate) fn switch_in(&self) {
        let mut turn = self.turn.lock().unwrap();
        if *turn == Turn::Finished {
            return;
        }
        *turn = Turn::Context;
        self.cvar.notify_all();
        while *turn == Turn::Context {
            turn = self.cvar.wait(turn).unwrap();
        }
    }

    /// Jumps out of the context, waking its caller; the context's thread
    /// blocks until the next `switch_in`. Must be called on the context's
    /// thread.
    pub(crate) fn switch_out(&self) {
        let mut turn = self.turn.lock().unwrap();
        *turn = Turn::Caller;
        self.cvar.notify_all();
        while *turn == Turn::Caller {
            turn = self.cvar.wait(turn).unwrap();
        }
    }

    fn wait_initial(&self) {
        let mut turn = self.turn.lock().unwrap();
        while *turn != Turn::Context {
            turn = self.cvar.wait(turn).unwrap();
        }
    }

    fn finish(&self) {
        let mut turn = self.turn.lock().unwrap();
        *turn = Turn::Finished;
        self.cvar.notify_all();
    }
}
