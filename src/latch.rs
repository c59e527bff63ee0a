use core::sync::atomic::{AtomicUsize, Ordering};

use std::sync::Mutex;

use crate::executor::ExecutorRef;
use crate::future::Future;
use crate::promise::Promise;

/// A single-use downward counter synchronizing tasks.
///
/// The counter is fixed at construction and only ever decremented. When it
/// hits zero the internal promise is fulfilled, releasing the waiter. A
/// latch of zero skips the promise entirely and every wait returns
/// immediately.
///
/// The promise's future is consumed by the first wait, so a latch supports
/// one waiting task.
pub struct Latch {
    count: AtomicUsize,
    future: Mutex<Option<Future<bool>>>,
    promise: Mutex<Option<Promise<bool>>>,
}

impl Latch {
    /// Creates a latch counting down from `count`.
    pub fn new(count: usize) -> Self {
        if count == 0 {
            return Latch {
                count: AtomicUsize::new(0),
                future: Mutex::new(None),
                promise: Mutex::new(None),
            };
        }
        let mut promise = Promise::new();
        let future = promise.get_future();
        Latch {
            count: AtomicUsize::new(count),
            future: Mutex::new(Some(future)),
            promise: Mutex::new(Some(promise)),
        }
    }

    /// The remaining count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Returns `true` once the counter has reached zero.
    pub fn try_wait(&self) -> bool {
        self.count() == 0
    }

    /// Decrements the counter by `update`; the decrement that reaches zero
    /// releases the waiter. Never suspends.
    pub fn count_down(&self, update: usize) {
        if self.promise.lock().unwrap().is_none() && self.count() == 0 {
            return;
        }
        let old = self.count.fetch_sub(update, Ordering::AcqRel);
        debug_assert!(old >= update, "latch counted down below zero");
        if old == update {
            if let Some(promise) = self.promise.lock().unwrap().take() {
                promise.set_value(true);
            }
        }
    }

    /// Suspends the current task until the counter reaches zero.
    ///
    /// # Panics
    ///
    /// Panics on a second wait — the latch supports a single waiter.
    pub async fn wait(&self) {
        if self.try_wait() && self.future.lock().unwrap().is_none() {
            return;
        }
        let future = self
            .future
            .lock()
            .unwrap()
            .take()
            .expect("latch already has a waiter");
        future.await;
    }

    /// Like [`wait`], with the release scheduled through `executor`.
    ///
    /// [`wait`]: Latch::wait
    pub async fn wait_via(&self, executor: ExecutorRef) {
        if self.try_wait() && self.future.lock().unwrap().is_none() {
            return;
        }
        let future = self
            .future
            .lock()
            .unwrap()
            .take()
            .expect("latch already has a waiter");
        future.via(executor).await;
    }

    /// Decrements by `update` and waits for the counter to reach zero.
    pub async fn arrive_and_wait(&self, update: usize) {
        self.count_down(update);
        self.wait().await;
    }
}
