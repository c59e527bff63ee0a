use core::cell::UnsafeCell;

use crate::condition_variable::ConditionVariable;
use crate::spin_lock::SpinLock;

/// A counting semaphore for lazy tasks.
///
/// The counter is decremented by [`acquire`] and incremented by
/// [`release`]. When the counter is zero, `acquire` suspends the current
/// task until a release arrives; [`try_acquire`] never suspends past the
/// internal lock.
///
/// [`acquire`]: CountingSemaphore::acquire
/// [`release`]: CountingSemaphore::release
/// [`try_acquire`]: CountingSemaphore::try_acquire
pub struct CountingSemaphore {
    lock: SpinLock,
    cv: ConditionVariable<SpinLock>,
    /// Guarded by `lock`.
    count: UnsafeCell<usize>,
}

// SAFETY: `count` is only accessed with `lock` held.
unsafe impl Send for CountingSemaphore {}
unsafe impl Sync for CountingSemaphore {}

impl CountingSemaphore {
    /// Creates a semaphore whose counter starts at `count`.
    pub fn new(count: usize) -> Self {
        CountingSemaphore {
            lock: SpinLock::new(),
            cv: ConditionVariable::new(),
            count: UnsafeCell::new(count),
        }
    }

    /// Waits until the counter is positive, then decrements it.
    pub async fn acquire(&self) {
        self.lock.lock().await;
        // SAFETY: lock held here and at every predicate evaluation.
        self.cv
            .wait(&self.lock, || unsafe { *self.count.get() > 0 })
            .await;
        unsafe {
            *self.count.get() -= 1;
        }
        self.lock.unlock();
    }

    /// Decrements the counter if it is positive; never waits for a
    /// release.
    pub async fn try_acquire(&self) -> bool {
        self.lock.lock().await;
        // SAFETY: lock held.
        let acquired = unsafe {
            let count = self.count.get();
            if *count > 0 {
                *count -= 1;
                true
            } else {
                false
            }
        };
        self.lock.unlock();
        acquired
    }

    /// Increments the counter by `update` and releases waiters: one for a
    /// single-unit release, all of them otherwise (each re-checks the
    /// counter and goes back to sleep if it lost the race).
    pub async fn release(&self, update: usize) {
        assert!(update > 0, "semaphore release of zero");
        self.lock.lock().await;
        unsafe {
            *self.count.get() += update;
        }
        if update > 1 {
            self.cv.notify_all();
        } else {
            self.cv.notify_one();
        }
        self.lock.unlock();
    }
}
