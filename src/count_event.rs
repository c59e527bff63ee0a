use core::sync::atomic::{AtomicUsize, Ordering};
use core::task::Waker;

use std::sync::Mutex;

/// A one-shot countdown barrier rendezvousing N completions with one
/// awaiter.
///
/// The counter starts at N+1: one unit per completion plus one for the
/// awaiting side, which registers its waker and then releases its own unit.
/// Exactly one call to [`down`] — the one whose decrement reaches zero —
/// receives the stored waker; that caller resumes the awaiter.
///
/// Collect-any style users count completions without ever reaching zero and
/// use [`down_count`] to identify the first one.
///
/// [`down`]: CountEvent::down
/// [`down_count`]: CountEvent::down_count
pub(crate) struct CountEvent {
    count: AtomicUsize,
    waker: Mutex<Option<Waker>>,
}

impl CountEvent {
    pub(crate) fn new(count: usize) -> Self {
        CountEvent {
            count: AtomicUsize::new(count + 1),
            waker: Mutex::new(None),
        }
    }

    /// Registers (or refreshes) the awaiting side's waker.
    pub(crate) fn set_awaiter(&self, waker: &Waker) {
        let mut slot = self.waker.lock().unwrap();
        match &*slot {
            Some(current) if current.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    /// Decrements by `n`; returns the stored waker iff the counter reached
    /// zero.
    pub(crate) fn down(&self, n: usize) -> Option<Waker> {
        let old = self.count.fetch_sub(n, Ordering::AcqRel);
        debug_assert!(old >= n);
        if old == n {
            self.waker.lock().unwrap().take()
        } else {
            None
        }
    }

    /// Decrements by `n`, returning the previous count.
    pub(crate) fn down_count(&self, n: usize) -> usize {
        self.count.fetch_sub(n, Ordering::AcqRel)
    }

    /// Takes the stored waker without touching the counter. Used by
    /// first-wins rendezvous, where the counter never reaches zero.
    pub(crate) fn take_awaiter(&self) -> Option<Waker> {
        self.waker.lock().unwrap().take()
    }

    /// `true` once the cumulative decrement has consumed the entire count.
    pub(crate) fn finished(&self) -> bool {
        self.count.load(Ordering::Acquire) == 0
    }
}
