use core::cell::UnsafeCell;
use core::future::Future as CoreFuture;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use core::task::{Context, Poll, Waker};

use std::sync::{Arc, Mutex as StdMutex};

/// An asynchronous mutual-exclusion lock.
///
/// The whole lock state lives in one atomic pointer:
///
/// - the unlocked sentinel — not locked;
/// - null — locked, no newly queued waiters;
/// - anything else — locked; the pointer heads a LIFO list of waiters that
///   queued since the holder last looked.
///
/// A second list, in FIFO order, is owned by the current holder: waiters it
/// has already dequeued. `unlock` serves that list first; only when it is
/// empty does it either release the lock or drain the LIFO list, reverse it
/// into FIFO order, and hand the lock to the head. The lock is handed over
/// directly — it is never observed unlocked between a holder and the waiter
/// it resumes, which is what makes the handoff FIFO-fair among dequeued
/// waiters.
///
/// Locking suspends; use it from lazy tasks only.
pub struct Mutex {
    state: AtomicPtr<LockWaiter>,
    /// FIFO list of already-dequeued waiters. Only the current lock holder
    /// touches this field.
    waiters: UnsafeCell<*mut LockWaiter>,
}

// SAFETY: `waiters` is only accessed by the thread currently holding the
// lock; the handoff from holder to holder is ordered by the grant flag and
// the state CASes.
unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

/// The unlocked sentinel: a distinguished address that is never a real
/// waiter and is stable across moves of the `Mutex`.
fn unlocked() -> *mut LockWaiter {
    static UNLOCKED: u8 = 0;
    &UNLOCKED as *const u8 as *mut LockWaiter
}

struct LockWaiter {
    waker: StdMutex<Option<Waker>>,
    granted: AtomicBool,
    /// Link to the next waiter. Written before the node is published,
    /// rewritten only during the holder's LIFO-to-FIFO reversal.
    next: UnsafeCell<*mut LockWaiter>,
}

// SAFETY: `next` mutation follows the publication protocol above.
unsafe impl Send for LockWaiter {}
unsafe impl Sync for LockWaiter {}

impl Mutex {
    /// Creates an unlocked mutex.
    pub fn new() -> Self {
        Mutex {
            state: AtomicPtr::new(unlocked()),
            waiters: UnsafeCell::new(core::ptr::null_mut()),
        }
    }

    /// Tries to take the lock without waiting.
    pub fn try_lock(&self) -> Option<MutexGuard<'_>> {
        if self.try_lock_raw() {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }

    fn try_lock_raw(&self) -> bool {
        self.state
            .compare_exchange(
                unlocked(),
                core::ptr::null_mut(),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Acquires the lock, suspending the current task while it is
    /// contended. Resolves to a guard releasing the lock on drop.
    pub fn lock(&self) -> LockFuture<'_> {
        LockFuture {
            mutex: self,
            node: None,
        }
    }

    /// Queues `node` unless the lock can be taken right away. Returns
    /// `true` if the caller must suspend.
    fn lock_async_impl(&self, node: &Arc<LockWaiter>) -> bool {
        // The queue's reference; reclaimed by `unlock` when it pops the
        // node, or released below if we win the lock instead.
        let node_ptr = Arc::into_raw(node.clone()) as *mut LockWaiter;
        let mut old = self.state.load(Ordering::Relaxed);
        loop {
            if old == unlocked() {
                match self.state.compare_exchange_weak(
                    old,
                    core::ptr::null_mut(),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // Acquired synchronously; drop the queue reference.
                        // SAFETY: node_ptr came from into_raw above.
                        unsafe { drop(Arc::from_raw(node_ptr)) };
                        return false;
                    }
                    Err(current) => old = current,
                }
            } else {
                // SAFETY: the node is not yet published; we own `next`.
                unsafe {
                    *node.next.get() = old;
                }
                match self.state.compare_exchange_weak(
                    old,
                    node_ptr,
                    Ordering::Release,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return true,
                    Err(current) => old = current,
                }
            }
        }
    }

    /// Releases the lock, handing it to the longest-waiting dequeued
    /// waiter if there is one.
    fn unlock_impl(&self) {
        debug_assert!(self.state.load(Ordering::Relaxed) != unlocked());
        unsafe {
            let mut head = *self.waiters.get();
            if head.is_null() {
                let current = self.state.load(Ordering::Relaxed);
                if current.is_null() {
                    match self.state.compare_exchange(
                        current,
                        unlocked(),
                        Ordering::Release,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => return,
                        Err(_) => {}
                    }
                }
                // Newly queued waiters slipped in; dequeue them all and
                // reverse LIFO into FIFO.
                let mut waiter = self.state.swap(core::ptr::null_mut(), Ordering::Acquire);
                debug_assert!(!waiter.is_null() && waiter != unlocked());
                while !waiter.is_null() {
                    let next = *(*waiter).next.get();
                    *(*waiter).next.get() = head;
                    head = waiter;
                    waiter = next;
                }
            }
            debug_assert!(!head.is_null());
            *self.waiters.get() = *(*head).next.get();
            // Reclaim the queue's reference and hand the lock over.
            let node = Arc::from_raw(head as *const LockWaiter);
            let waker = node.waker.lock().unwrap().take();
            node.granted.store(true, Ordering::Release);
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Mutex::new()
    }
}

/// RAII guard of a [`Mutex`]; releases the lock on drop.
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock_impl();
    }
}

/// Future returned by [`Mutex::lock`].
#[must_use = "the lock is not acquired until awaited"]
pub struct LockFuture<'a> {
    mutex: &'a Mutex,
    node: Option<Arc<LockWaiter>>,
}

impl<'a> CoreFuture for LockFuture<'a> {
    type Output = MutexGuard<'a>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<MutexGuard<'a>> {
        let this = self.get_mut();

        if let Some(node) = &this.node {
            if node.granted.load(Ordering::Acquire) {
                return Poll::Ready(MutexGuard { mutex: this.mutex });
            }
            *node.waker.lock().unwrap() = Some(cx.waker().clone());
            // The grant may have raced the waker update.
            if node.granted.load(Ordering::Acquire) {
                return Poll::Ready(MutexGuard { mutex: this.mutex });
            }
            return Poll::Pending;
        }

        if this.mutex.try_lock_raw() {
            return Poll::Ready(MutexGuard { mutex: this.mutex });
        }
        let node = Arc::new(LockWaiter {
            waker: StdMutex::new(Some(cx.waker().clone())),
            granted: AtomicBool::new(false),
            next: UnsafeCell::new(core::ptr::null_mut()),
        });
        if this.mutex.lock_async_impl(&node) {
            this.node = Some(node);
            Poll::Pending
        } else {
            Poll::Ready(MutexGuard { mutex: this.mutex })
        }
    }
}
