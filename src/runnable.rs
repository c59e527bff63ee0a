use core::future::Future;
use core::mem;
use core::ptr::NonNull;

use crate::current::ChainHandle;
use crate::executor::ScheduleInfo;
use crate::header::Header;
use crate::raw::{teardown, RawRoot};

/// Creates a root task record for `future`, resuming through `chain`.
///
/// The returned [`Runnable`] owns the first reference. Running it polls the
/// future once; afterwards the runnable only reappears — recreated by the
/// task's waker and handed to the chain — when the future is woken.
pub(crate) fn spawn_root<F>(future: F, chain: ChainHandle) -> Runnable
where
    F: Future<Output = ()> + Send + 'static,
{
    Runnable {
        ptr: RawRoot::<F>::allocate(future, chain),
    }
}

/// A reference to a root task that is ready to be polled.
///
/// At any moment at most one `Runnable` for a given task exists. Dropping a
/// runnable without running it drops the task's future.
pub(crate) struct Runnable {
    ptr: NonNull<()>,
}

// SAFETY: the record is `Send` (its future is) and all shared mutation goes
// through atomics.
unsafe impl Send for Runnable {}

impl Runnable {
    /// Rebuilds a runnable from a raw record pointer, taking over the
    /// reference the caller holds.
    pub(crate) unsafe fn from_raw(ptr: NonNull<()>) -> Self {
        Runnable { ptr }
    }

    /// Polls the task once. Returns `true` if the task was woken while
    /// running, in which case it has already been resubmitted.
    pub(crate) fn run(self) -> bool {
        let ptr = self.ptr.as_ptr();
        mem::forget(self);
        // SAFETY: this runnable owned a reference; `run` consumes it.
        unsafe { ((*(ptr as *const Header)).vtable.run)(ptr) }
    }

    /// Resubmits the task through its chain with the given hint.
    pub(crate) fn schedule(self, info: ScheduleInfo) {
        let ptr = self.ptr.as_ptr();
        mem::forget(self);
        // SAFETY: as in `run`; the reference transfers to the new runnable.
        unsafe { ((*(ptr as *const Header)).vtable.schedule)(ptr, info) }
    }
}

impl Drop for Runnable {
    fn drop(&mut self) {
        // SAFETY: dropping the last chance to run this task; tear it down.
        unsafe { teardown(self.ptr.as_ptr()) }
    }
}
