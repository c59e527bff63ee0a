//! Awaiters bridging [`Future`] values into lazy tasks.
//!
//! Awaiting a `Future` inside a lazy must bring the task back onto one of
//! its executor's workers afterwards — the producer may fulfill the promise
//! from an arbitrary thread. The awaiter captures the awaiting chain's
//! executor and a checked-out worker context at suspension time, then routes
//! the resumption through `checkin`, preferring the worker the task was on.
//!
//! [`Future`]: crate::Future

use core::future::{Future as CoreFuture, IntoFuture};
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll, Waker};

use std::sync::{Arc, Mutex};

use crate::current::current_chain;
use crate::executor::{SchedContext, ScheduleOptions};
use crate::future::Future;
use crate::try_value::Try;

struct ResultSlot<T> {
    done: AtomicBool,
    value: Mutex<Option<Try<T>>>,
    waker: Mutex<Option<Waker>>,
}

impl<T> ResultSlot<T> {
    fn new() -> Arc<Self> {
        Arc::new(ResultSlot {
            done: AtomicBool::new(false),
            value: Mutex::new(None),
            waker: Mutex::new(None),
        })
    }

    fn fulfill(&self, value: Try<T>) {
        *self.value.lock().unwrap() = Some(value);
        self.done.store(true, Ordering::Release);
    }

    fn fire(&self) {
        let waker = self.waker.lock().unwrap().take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

fn poll_slot<T: Send + 'static>(slot: &ResultSlot<T>, cx: &mut Context<'_>) -> Poll<T> {
    *slot.waker.lock().unwrap() = Some(cx.waker().clone());
    if slot.done.load(Ordering::Acquire) {
        let value = slot.value.lock().unwrap().take().expect("result consumed twice");
        Poll::Ready(value.value_or_raise())
    } else {
        Poll::Pending
    }
}

/// Awaiter installed when a lazy task awaits a [`Future`].
///
/// Resumption prefers the worker the task suspended on; with no executor on
/// the chain the continuation resumes the task in place.
pub struct FutureAwaiter<T: Send + 'static> {
    future: Option<Future<T>>,
    slot: Arc<ResultSlot<T>>,
}

impl<T: Send + 'static> Unpin for FutureAwaiter<T> {}

impl<T: Send + 'static> CoreFuture for FutureAwaiter<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        if let Some(future) = this.future.take() {
            if future.has_result() {
                return Poll::Ready(future.value());
            }
            let executor = current_chain().and_then(|chain| chain.executor());
            let context = executor
                .as_ref()
                .map_or(SchedContext::NONE, |e| e.checkout());
            *this.slot.waker.lock().unwrap() = Some(cx.waker().clone());
            let slot = this.slot.clone();
            future.set_continuation(move |value| {
                slot.fulfill(value);
                match &executor {
                    Some(executor) => {
                        let fire = {
                            let slot = slot.clone();
                            Box::new(move || slot.fire())
                        };
                        let opts = ScheduleOptions::default();
                        if !executor.checkin(fire, context, opts) {
                            slot.fire();
                        }
                    }
                    None => slot.fire(),
                }
            });
            return Poll::Pending;
        }
        poll_slot(&this.slot, cx)
    }
}

impl<T: Send + 'static> IntoFuture for Future<T> {
    type Output = T;
    type IntoFuture = FutureAwaiter<T>;

    fn into_future(self) -> FutureAwaiter<T> {
        FutureAwaiter {
            future: Some(self),
            slot: ResultSlot::new(),
        }
    }
}

/// Awaits a [`Future`] with the guarantee that the awaiting task resumes
/// through `schedule` on its executor — never on the producer's thread.
///
/// Use this when the producer's thread must not be stolen to run the
/// consumer. Requires the awaiting chain to have an executor; without one
/// the resumption degrades to running in place, like the plain awaiter.
pub fn resume_by_schedule<T: Send + 'static>(future: Future<T>) -> ResumeByScheduleAwaiter<T> {
    ResumeByScheduleAwaiter {
        future: Some(future),
        slot: ResultSlot::new(),
    }
}

/// Awaiter returned by [`resume_by_schedule`].
pub struct ResumeByScheduleAwaiter<T: Send + 'static> {
    future: Option<Future<T>>,
    slot: Arc<ResultSlot<T>>,
}

impl<T: Send + 'static> Unpin for ResumeByScheduleAwaiter<T> {}

impl<T: Send + 'static> CoreFuture for ResumeByScheduleAwaiter<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        if let Some(future) = this.future.take() {
            if future.has_result() {
                return Poll::Ready(future.value());
            }
            let executor = current_chain().and_then(|chain| chain.executor());
            *this.slot.waker.lock().unwrap() = Some(cx.waker().clone());
            let slot = this.slot.clone();
            future.set_continuation(move |value| {
                slot.fulfill(value);
                match &executor {
                    Some(executor) => {
                        let fire = {
                            let slot = slot.clone();
                            Box::new(move || slot.fire())
                        };
                        if !executor.schedule(fire) {
                            slot.fire();
                        }
                    }
                    None => slot.fire(),
                }
            });
            return Poll::Pending;
        }
        poll_slot(&this.slot, cx)
    }
}

/// An awaitable that never suspends and produces `value` directly. The
/// degenerate member of the awaiter family; useful for returning a value
/// from a suspension-point-shaped API.
pub fn ready_awaiter<T>(value: T) -> ReadyAwaiter<T> {
    ReadyAwaiter { value: Some(value) }
}

/// Awaiter returned by [`ready_awaiter`].
pub struct ReadyAwaiter<T> {
    value: Option<T>,
}

impl<T> Unpin for ReadyAwaiter<T> {}

impl<T> CoreFuture for ReadyAwaiter<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<T> {
        Poll::Ready(self.get_mut().value.take().expect("ready awaiter polled twice"))
    }
}
