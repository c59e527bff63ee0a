use core::future::Future as CoreFuture;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll, Waker};

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::executor::{ExecutorRef, ScheduleInfo};
use crate::lazy::current_executor;

/// Suspends the current task for `duration`.
///
/// With an executor on the chain this submits a delayed resumption through
/// [`Executor::schedule_after`]. Without one the current thread sleeps —
/// a documented degradation for tasks running outside any executor.
///
/// [`Executor::schedule_after`]: crate::Executor::schedule_after
pub async fn sleep(duration: Duration) {
    sleep_with_info(duration, ScheduleInfo::default()).await
}

/// [`sleep`] with an explicit scheduling hint.
pub async fn sleep_with_info(duration: Duration, info: ScheduleInfo) {
    match current_executor().await {
        Some(executor) => TimerAwaiter::new(executor, duration, info).await,
        None => thread::sleep(duration),
    }
}

/// Suspends the current task for `duration` on an explicit executor.
pub async fn sleep_on(executor: ExecutorRef, duration: Duration, info: ScheduleInfo) {
    TimerAwaiter::new(executor, duration, info).await
}

/// Awaiter that resumes after a delay, via the executor's timer.
struct TimerAwaiter {
    executor: ExecutorRef,
    duration: Duration,
    info: ScheduleInfo,
    state: Option<Arc<TimerState>>,
}

struct TimerState {
    fired: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl TimerAwaiter {
    fn new(executor: ExecutorRef, duration: Duration, info: ScheduleInfo) -> Self {
        TimerAwaiter {
            executor,
            duration,
            info,
            state: None,
        }
    }
}

impl CoreFuture for TimerAwaiter {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match &this.state {
            None => {
                let state = Arc::new(TimerState {
                    fired: AtomicBool::new(false),
                    waker: Mutex::new(Some(cx.waker().clone())),
                });
                this.state = Some(state.clone());
                let timer = {
                    let state = state.clone();
                    Box::new(move || {
                        state.fired.store(true, Ordering::Release);
                        let waker = state.waker.lock().unwrap().take();
                        if let Some(waker) = waker {
                            waker.wake();
                        }
                    })
                };
                if !this
                    .executor
                    .schedule_after(timer, this.duration, this.info)
                {
                    // No timer available: degrade to a blocking sleep.
                    thread::sleep(this.duration);
                    return Poll::Ready(());
                }
                Poll::Pending
            }
            Some(state) => {
                *state.waker.lock().unwrap() = Some(cx.waker().clone());
                if state.fired.load(Ordering::Acquire) {
                    Poll::Ready(())
                } else {
                    Poll::Pending
                }
            }
        }
    }
}
