use core::cell::UnsafeCell;
use core::future::Future as CoreFuture;
use core::marker::PhantomData;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use core::task::{Context, Poll, Waker};

use std::sync::{Arc, Mutex as StdMutex};

use crate::spin_lock::{AsyncScopedLock, SpinLock};

/// An asynchronous condition variable paired with an [`AsyncScopedLock`].
///
/// Waiters form a lock-free LIFO stack. [`wait`] pushes a node while still
/// holding the lock, releases the lock as it suspends, and reacquires it
/// before re-testing the predicate, so a notifier that takes the lock
/// before notifying cannot lose a waiter.
///
/// [`wait`]: ConditionVariable::wait
pub struct ConditionVariable<L: AsyncScopedLock = SpinLock> {
    awaiters: AtomicPtr<CvWaiter>,
    _lock: PhantomData<fn(&L)>,
}

struct CvWaiter {
    waker: StdMutex<Option<Waker>>,
    notified: AtomicBool,
    /// Only written while the node is detached from the stack, before each
    /// publication.
    next: UnsafeCell<*mut CvWaiter>,
}

// SAFETY: `next` is only written by the node's current owner (pusher or
// notifier holding the detached list); all other fields are synchronized.
unsafe impl Send for CvWaiter {}
unsafe impl Sync for CvWaiter {}

impl<L: AsyncScopedLock> ConditionVariable<L> {
    /// Creates a condition variable with no waiters.
    pub fn new() -> Self {
        ConditionVariable {
            awaiters: AtomicPtr::new(core::ptr::null_mut()),
            _lock: PhantomData,
        }
    }

    /// Waits until `predicate` holds.
    ///
    /// Caller must hold `lock`; on return the caller holds it again. While
    /// suspended the lock is released.
    pub async fn wait<P>(&self, lock: &L, mut predicate: P)
    where
        P: FnMut() -> bool,
    {
        while !predicate() {
            WaitFuture {
                cv: self,
                lock,
                node: None,
            }
            .await;
            lock.lock().await;
        }
    }

    /// Resumes one waiter.
    ///
    /// Detaches the whole stack, resumes its head, and pushes the
    /// remainder back — a plain pop could race another notifier into
    /// touching a node it no longer owns.
    pub fn notify_one(&self) {
        let head = self.awaiters.swap(core::ptr::null_mut(), Ordering::Acquire);
        if head.is_null() {
            return;
        }
        // SAFETY: the swap transferred ownership of every node in the
        // detached list to this thread.
        let rest = unsafe { *(*head).next.get() };
        let node = unsafe { Arc::from_raw(head as *const CvWaiter) };
        resume(&node);
        if rest.is_null() {
            return;
        }
        // Splice the remainder back under whatever got pushed meanwhile.
        unsafe {
            let mut tail = rest;
            while !(*(*tail).next.get()).is_null() {
                tail = *(*tail).next.get();
            }
            let mut current = self.awaiters.load(Ordering::Relaxed);
            loop {
                *(*tail).next.get() = current;
                match self.awaiters.compare_exchange_weak(
                    current,
                    rest,
                    Ordering::Release,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return,
                    Err(now) => current = now,
                }
            }
        }
    }

    /// Resumes every waiter currently queued.
    pub fn notify_all(&self) {
        let mut head = self.awaiters.swap(core::ptr::null_mut(), Ordering::Acquire);
        while !head.is_null() {
            // SAFETY: as in notify_one.
            let next = unsafe { *(*head).next.get() };
            let node = unsafe { Arc::from_raw(head as *const CvWaiter) };
            resume(&node);
            head = next;
        }
    }

    fn push(&self, node: &Arc<CvWaiter>) {
        let node_ptr = Arc::into_raw(node.clone()) as *mut CvWaiter;
        let mut head = self.awaiters.load(Ordering::Relaxed);
        loop {
            // SAFETY: not yet published; we own `next`.
            unsafe {
                *node.next.get() = head;
            }
            match self.awaiters.compare_exchange_weak(
                head,
                node_ptr,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }
}

impl<L: AsyncScopedLock> Default for ConditionVariable<L> {
    fn default() -> Self {
        ConditionVariable::new()
    }
}

fn resume(node: &Arc<CvWaiter>) {
    let waker = node.waker.lock().unwrap().take();
    node.notified.store(true, Ordering::Release);
    if let Some(waker) = waker {
        waker.wake();
    }
}

/// One suspension of a waiter: pushes the node under the lock, releases
/// the lock, and resolves once notified. The lock is *not* reacquired here;
/// [`ConditionVariable::wait`] does that before re-testing.
struct WaitFuture<'a, L: AsyncScopedLock> {
    cv: &'a ConditionVariable<L>,
    lock: &'a L,
    node: Option<Arc<CvWaiter>>,
}

impl<L: AsyncScopedLock> CoreFuture for WaitFuture<'_, L> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        if let Some(node) = &this.node {
            if node.notified.load(Ordering::Acquire) {
                return Poll::Ready(());
            }
            *node.waker.lock().unwrap() = Some(cx.waker().clone());
            if node.notified.load(Ordering::Acquire) {
                return Poll::Ready(());
            }
            return Poll::Pending;
        }

        let node = Arc::new(CvWaiter {
            waker: StdMutex::new(Some(cx.waker().clone())),
            notified: AtomicBool::new(false),
            next: UnsafeCell::new(core::ptr::null_mut()),
        });
        // Publish while still holding the lock, then release it: a
        // notifier serialized by the lock is guaranteed to see this node.
        this.cv.push(&node);
        this.lock.unlock();
        this.node = Some(node);
        Poll::Pending
    }
}
