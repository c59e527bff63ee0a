use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use lazy_promise::{sync_await, sync_await_try, Error, Executor, Func, Lazy, Try};

mod common;
use common::ThreadPool;

// An executor that runs every submission immediately on the calling
// thread and counts them, so launch and reschedule steps are observable
// one by one.
struct InlineExecutor {
    schedules: Arc<AtomicUsize>,
}

impl Executor for InlineExecutor {
    fn schedule(&self, func: Func) -> bool {
        self.schedules.fetch_add(1, Ordering::SeqCst);
        func();
        true
    }

    fn in_current_thread(&self) -> bool {
        false
    }
}

// Creates a lazy task with event counters.
//
// Usage: `lazy!(l, POLL, DROP)`
//
// The task always completes with 7 on first poll.
// When it gets polled, `POLL` is incremented.
// When its future gets dropped, `DROP` is incremented.
macro_rules! lazy {
    ($name:pat, $poll:ident, $drop:ident) => {
        static $poll: AtomicUsize = AtomicUsize::new(0);
        static $drop: AtomicUsize = AtomicUsize::new(0);

        let $name = {
            struct Fut(Box<i32>);

            impl Future for Fut {
                type Output = i32;

                fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
                    $poll.fetch_add(1, Ordering::SeqCst);
                    Poll::Ready(*self.0)
                }
            }

            impl Drop for Fut {
                fn drop(&mut self) {
                    $drop.fetch_add(1, Ordering::SeqCst);
                }
            }

            Lazy::new(Fut(Box::new(7)))
        };
    };
}

#[test]
fn start_runs_once() {
    static CALLBACK: AtomicUsize = AtomicUsize::new(0);
    lazy!(l, POLL, DROP_F);

    assert_eq!(POLL.load(Ordering::SeqCst), 0);
    assert_eq!(DROP_F.load(Ordering::SeqCst), 0);

    l.start(|value| {
        assert_eq!(value.as_value(), Some(&7));
        CALLBACK.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(POLL.load(Ordering::SeqCst), 1);
    assert_eq!(DROP_F.load(Ordering::SeqCst), 1);
    assert_eq!(CALLBACK.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_without_start() {
    lazy!(l, POLL, DROP_F);

    drop(l);
    assert_eq!(POLL.load(Ordering::SeqCst), 0);
    assert_eq!(DROP_F.load(Ordering::SeqCst), 1);
}

#[test]
fn sync_await_value() {
    assert_eq!(sync_await(Lazy::new(async { 2 + 3 })), 5);
}

#[test]
fn nested_awaits_transfer_directly() {
    fn level(depth: usize) -> Lazy<usize> {
        Lazy::new(async move {
            if depth == 0 {
                0
            } else {
                level(depth - 1).await + 1
            }
        })
    }
    assert_eq!(sync_await(level(500)), 500);
}

#[test]
fn panic_is_captured_by_try() {
    let result = sync_await_try(Lazy::new(async {
        panic!("boom");
        #[allow(unreachable_code)]
        0
    }));
    match result {
        Try::Error(Error::Panic(_)) => {}
        other => panic!("expected a captured panic, got {:?}", other),
    }
}

#[test]
fn try_await_propagates_values() {
    let result = sync_await(Lazy::new(async {
        let inner = Lazy::new(async { 11 });
        inner.try_await().await
    }));
    assert_eq!(result.as_value(), Some(&11));
}

#[test]
fn start_on_executor_invokes_callback_on_worker() {
    let pool = ThreadPool::new(2);
    let (tx, rx) = flume::bounded(1);
    let lazy = Lazy::new(async { 40 + 2 });
    lazy.via(pool.clone()).start(move |value| {
        tx.send(value.into_result().unwrap()).unwrap();
    });
    assert_eq!(rx.recv().unwrap(), 42);
}

#[test]
fn directly_start_begins_inline() {
    static POLLED_ON_CALLER: AtomicUsize = AtomicUsize::new(0);
    let pool = ThreadPool::new(1);
    let caller = std::thread::current().id();
    let (tx, rx) = flume::bounded(1);
    let lazy = Lazy::new(async move {
        if std::thread::current().id() == caller {
            POLLED_ON_CALLER.fetch_add(1, Ordering::SeqCst);
        }
    });
    lazy.directly_start(move |_| tx.send(()).unwrap(), pool.clone());
    rx.recv().unwrap();
    assert_eq!(POLLED_ON_CALLER.load(Ordering::SeqCst), 1);
}

#[test]
fn detach_reraises_nothing_on_success() {
    let pool = ThreadPool::new(1);
    let (tx, rx) = flume::bounded(1);
    Lazy::new(async move {
        tx.send(7).unwrap();
    })
    .via(pool.clone())
    .detach();
    assert_eq!(rx.recv().unwrap(), 7);
}

// Waking a task while its poll is still in progress must not hand out a
// second runnable; the running thread observes the wake after the poll and
// reschedules exactly once.
#[test]
fn wake_while_running_reschedules_once() {
    static POLL: AtomicUsize = AtomicUsize::new(0);
    static CALLBACK: AtomicUsize = AtomicUsize::new(0);

    struct WakeMidRun;

    impl Future for WakeMidRun {
        type Output = i32;

        fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<i32> {
            if POLL.fetch_add(1, Ordering::SeqCst) == 0 {
                // Wake ourselves while this poll is still running.
                cx.waker().wake_by_ref();
                Poll::Pending
            } else {
                Poll::Ready(7)
            }
        }
    }

    let schedules = Arc::new(AtomicUsize::new(0));
    let executor = Arc::new(InlineExecutor {
        schedules: schedules.clone(),
    });
    Lazy::new(WakeMidRun).via(executor).start(|value| {
        assert_eq!(value.as_value(), Some(&7));
        CALLBACK.fetch_add(1, Ordering::SeqCst);
    });

    // One launch submission plus exactly one reschedule for the mid-run
    // wake. A lost wake would leave the poll count at one, a duplicated
    // runnable would push it past two.
    assert_eq!(schedules.load(Ordering::SeqCst), 2);
    assert_eq!(POLL.load(Ordering::SeqCst), 2);
    assert_eq!(CALLBACK.load(Ordering::SeqCst), 1);
}

// A waker captured from inside poll reschedules a parked task exactly
// once; waking again after completion is a no-op.
#[test]
fn captured_waker_wakes_exactly_once() {
    static POLL: AtomicUsize = AtomicUsize::new(0);
    static CALLBACK: AtomicUsize = AtomicUsize::new(0);
    static WAKER: Mutex<Option<Waker>> = Mutex::new(None);

    struct Parks;

    impl Future for Parks {
        type Output = i32;

        fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<i32> {
            if POLL.fetch_add(1, Ordering::SeqCst) == 0 {
                *WAKER.lock().unwrap() = Some(cx.waker().clone());
                Poll::Pending
            } else {
                Poll::Ready(9)
            }
        }
    }

    let schedules = Arc::new(AtomicUsize::new(0));
    let executor = Arc::new(InlineExecutor {
        schedules: schedules.clone(),
    });
    Lazy::new(Parks).via(executor).start(|value| {
        assert_eq!(value.as_value(), Some(&9));
        CALLBACK.fetch_add(1, Ordering::SeqCst);
    });

    // Parked after the launch submission.
    assert_eq!(schedules.load(Ordering::SeqCst), 1);
    assert_eq!(POLL.load(Ordering::SeqCst), 1);
    assert_eq!(CALLBACK.load(Ordering::SeqCst), 0);

    let waker = WAKER.lock().unwrap().take().unwrap();
    waker.wake_by_ref();
    assert_eq!(schedules.load(Ordering::SeqCst), 2);
    assert_eq!(POLL.load(Ordering::SeqCst), 2);
    assert_eq!(CALLBACK.load(Ordering::SeqCst), 1);

    // The task completed; a stray wake must neither schedule nor poll.
    waker.wake();
    assert_eq!(schedules.load(Ordering::SeqCst), 2);
    assert_eq!(POLL.load(Ordering::SeqCst), 2);
}

#[test]
fn sync_await_via_runs_on_pool() {
    let pool = ThreadPool::new(1);
    let inner = pool.clone();
    let on_worker = lazy_promise::sync_await_via(
        Lazy::new(async move { inner.in_current_thread() }),
        pool.clone(),
    );
    assert!(on_worker);
}
