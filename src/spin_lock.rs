use core::future::Future as CoreFuture;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};

use std::thread;

use crate::lazy::yield_now;

/// A test-and-set lock with a bounded spin.
///
/// After `spin_count` failed spins the async path yields to the executor
/// (so queued work can make progress and eventually release the lock) and
/// the blocking path yields the OS thread. The default budget is 1024
/// spins.
///
/// Works both from lazy tasks ([`lock`], [`scoped_lock`]) and from plain
/// threads ([`lock_blocking`]).
///
/// [`lock`]: SpinLock::lock
/// [`scoped_lock`]: SpinLock::scoped_lock
/// [`lock_blocking`]: SpinLock::lock_blocking
pub struct SpinLock {
    spin_count: i32,
    locked: AtomicBool,
}

impl SpinLock {
    /// Creates an unlocked spin lock with the default spin budget.
    pub fn new() -> Self {
        Self::with_spin_count(1024)
    }

    /// Creates an unlocked spin lock spinning `spin_count` times before
    /// yielding.
    pub fn with_spin_count(spin_count: i32) -> Self {
        SpinLock {
            spin_count,
            locked: AtomicBool::new(false),
        }
    }

    /// Tries to take the lock without waiting.
    pub fn try_lock(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    /// Acquires the lock, yielding to the executor when the spin budget
    /// runs out. Pair with [`unlock`].
    ///
    /// [`unlock`]: SpinLock::unlock
    pub async fn lock(&self) {
        let mut counter = self.spin_count;
        while !self.try_lock() {
            while self.locked.load(Ordering::Relaxed) {
                counter -= 1;
                if counter <= 0 {
                    yield_now().await;
                    counter = self.spin_count;
                }
            }
        }
    }

    /// Acquires the lock from a plain thread, yielding the OS thread when
    /// the spin budget runs out.
    pub fn lock_blocking(&self) {
        let mut counter = self.spin_count;
        while !self.try_lock() {
            while self.locked.load(Ordering::Relaxed) {
                counter -= 1;
                if counter <= 0 {
                    thread::yield_now();
                    counter = self.spin_count;
                }
            }
        }
    }

    /// Releases the lock. Caller must hold it.
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Acquires the lock and returns a guard releasing it on drop.
    pub async fn scoped_lock(&self) -> SpinLockGuard<'_> {
        self.lock().await;
        SpinLockGuard { lock: self }
    }

    /// Blocking flavor of [`scoped_lock`].
    ///
    /// [`scoped_lock`]: SpinLock::scoped_lock
    pub fn blocking_guard(&self) -> SpinLockGuard<'_> {
        self.lock_blocking();
        SpinLockGuard { lock: self }
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        SpinLock::new()
    }
}

/// RAII guard of a [`SpinLock`].
pub struct SpinLockGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// A lock usable by [`ConditionVariable`]: asynchronous acquire paired with
/// a synchronous release, so a waiter can drop the lock while suspending
/// and take it back before re-checking its predicate.
///
/// [`ConditionVariable`]: crate::ConditionVariable
pub trait AsyncScopedLock: Send + Sync {
    /// Acquires the lock.
    fn lock(&self) -> Pin<Box<dyn CoreFuture<Output = ()> + Send + '_>>;

    /// Releases the lock. Caller must hold it.
    fn unlock(&self);
}

impl AsyncScopedLock for SpinLock {
    fn lock(&self) -> Pin<Box<dyn CoreFuture<Output = ()> + Send + '_>> {
        Box::pin(SpinLock::lock(self))
    }

    fn unlock(&self) {
        SpinLock::unlock(self)
    }
}
