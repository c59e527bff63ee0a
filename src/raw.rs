use core::future::Future;
use core::mem::ManuallyDrop;
use core::pin::Pin;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use crate::current::{with_frame, ChainHandle};
use crate::executor::ScheduleInfo;
use crate::header::Header;
use crate::runnable::Runnable;
use crate::state::*;
use crate::utils::abort_on_panic;

/// The vtable of a root task record.
///
/// In addition to the waker operations it carries the bookkeeping methods
/// the type-erased handles need.
pub(crate) struct RootVTable {
    /// Resubmits the task through its chain.
    pub(crate) schedule: unsafe fn(*const (), ScheduleInfo),

    /// Drops the future inside the record.
    pub(crate) drop_future: unsafe fn(*const ()),

    /// Drops one reference (`Runnable` or `Waker`).
    pub(crate) drop_ref: unsafe fn(*const ()),

    /// Runs the task. Returns `true` if it was rescheduled while running.
    pub(crate) run: unsafe fn(*const ()) -> bool,
}

/// A root task record: one allocation holding the state header, the chain
/// handle the task resumes through, and the root future itself.
///
/// `Header` is the first field and the struct is `repr(C)`, so a pointer to
/// the record is a pointer to its header.
#[repr(C)]
pub(crate) struct RawRoot<F> {
    header: Header,
    chain: ChainHandle,
    future: ManuallyDrop<F>,
}

impl<F> RawRoot<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    const RAW_WAKER_VTABLE: RawWakerVTable = RawWakerVTable::new(
        Self::clone_waker,
        Self::wake,
        Self::wake_by_ref,
        Self::drop_waker,
    );

    /// Allocates a record for `future`. The initial state is scheduled with
    /// a single reference, owned by the returned pointer's `Runnable`.
    pub(crate) fn allocate(future: F, chain: ChainHandle) -> NonNull<()> {
        let boxed = Box::new(RawRoot {
            header: Header {
                state: AtomicUsize::new(SCHEDULED | REFERENCE),
                vtable: &RootVTable {
                    schedule: Self::schedule,
                    drop_future: Self::drop_future,
                    drop_ref: Self::drop_ref,
                    run: Self::run,
                },
            },
            chain,
            future: ManuallyDrop::new(future),
        });
        // SAFETY: Box::into_raw never returns null.
        unsafe { NonNull::new_unchecked(Box::into_raw(boxed) as *mut ()) }
    }

    /// The state word of the record behind `ptr`, which callers must keep
    /// alive by holding a reference. Header is the record's first field.
    #[inline]
    unsafe fn state<'a>(ptr: *const ()) -> &'a AtomicUsize {
        &(*(ptr as *const Header)).state
    }

    /// Wakes the task, scheduling it unless it is already scheduled,
    /// running, or completed.
    unsafe fn wake(ptr: *const ()) {
        Self::wake_by_ref(ptr);
        Self::drop_waker(ptr);
    }

    unsafe fn wake_by_ref(ptr: *const ()) {
        let mut state = Self::state(ptr).load(Ordering::Acquire);

        loop {
            // A completed task can't be woken up.
            if state & COMPLETED != 0 {
                break;
            }

            // If the task is already scheduled, only publish the waking
            // thread's view of memory to whoever runs it.
            if state & SCHEDULED != 0 {
                match Self::state(ptr).compare_exchange_weak(
                    state,
                    state,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(s) => state = s,
                }
            } else {
                // If the task is not running, waking transfers a fresh
                // reference into a new runnable. If it is running, the
                // running thread observes SCHEDULED after its poll and
                // reschedules with the reference it already holds.
                let new = if state & RUNNING == 0 {
                    (state | SCHEDULED) + REFERENCE
                } else {
                    state | SCHEDULED
                };

                match Self::state(ptr).compare_exchange_weak(
                    state,
                    new,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        if state & RUNNING == 0 {
                            if state > isize::MAX as usize {
                                std::process::abort();
                            }
                            Self::schedule(ptr, ScheduleInfo::default());
                        }
                        break;
                    }
                    Err(s) => state = s,
                }
            }
        }
    }

    unsafe fn clone_waker(ptr: *const ()) -> RawWaker {
        let state = Self::state(ptr).fetch_add(REFERENCE, Ordering::Relaxed);
        if state > isize::MAX as usize {
            std::process::abort();
        }
        RawWaker::new(ptr, &Self::RAW_WAKER_VTABLE)
    }

    unsafe fn drop_waker(ptr: *const ()) {
        Self::drop_ref(ptr);
    }

    /// Drops one reference; the last reference destroys the record.
    #[inline]
    unsafe fn drop_ref(ptr: *const ()) {
        let new = Self::state(ptr).fetch_sub(REFERENCE, Ordering::AcqRel) - REFERENCE;
        if new & !(REFERENCE - 1) == 0 {
            // The future is dropped before the last reference can go away:
            // completion and runnable teardown both set COMPLETED first.
            debug_assert!(new & COMPLETED != 0);
            Self::destroy(ptr);
        }
    }

    /// Resubmits the task through its chain. Does not touch the state; the
    /// caller has already transferred a reference into the new `Runnable`.
    unsafe fn schedule(ptr: *const (), info: ScheduleInfo) {
        // Guard the record across the submission: the chain handle lives
        // inside the record, so it must stay alive until `submit` returns
        // even if the runnable finishes inline.
        let guard = Waker::from_raw(Self::clone_waker(ptr));
        let chain = (*(ptr as *const RawRoot<F>)).chain.clone();
        let runnable = Runnable::from_raw(NonNull::new_unchecked(ptr as *mut ()));
        chain.submit(runnable, info);
        drop(guard);
    }

    #[inline]
    unsafe fn drop_future(ptr: *const ()) {
        let record = ptr as *mut RawRoot<F>;
        abort_on_panic(|| unsafe {
            ManuallyDrop::drop(&mut (*record).future);
        });
    }

    /// Deallocates the record. The future must already be dropped.
    unsafe fn destroy(ptr: *const ()) {
        abort_on_panic(|| unsafe {
            drop(Box::from_raw(ptr as *mut RawRoot<F>));
        });
    }

    /// Polls the root future once.
    ///
    /// Panics cannot cross this boundary: the root future wraps user code
    /// in its own capture layer, so a panic here means that layer is broken
    /// and the process aborts.
    unsafe fn run(ptr: *const ()) -> bool {
        let record = ptr as *mut RawRoot<F>;

        let waker = ManuallyDrop::new(Waker::from_raw(RawWaker::new(ptr, &Self::RAW_WAKER_VTABLE)));
        let cx = &mut Context::from_waker(&waker);

        let mut state = Self::state(ptr).load(Ordering::Acquire);
        loop {
            // A runnable for a task that was torn down is a stale handoff;
            // just release its reference.
            if state & COMPLETED != 0 {
                Self::drop_ref(ptr);
                return false;
            }
            match Self::state(ptr).compare_exchange_weak(
                state,
                (state & !SCHEDULED) | RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    state = (state & !SCHEDULED) | RUNNING;
                    break;
                }
                Err(s) => state = s,
            }
        }

        let chain = (*record).chain.clone();
        // SAFETY: RUNNING grants exclusive access to the future, and the
        // record never moves.
        let future_ptr = core::ptr::addr_of_mut!((*record).future) as *mut F;
        let poll = abort_on_panic(|| {
            with_frame(&chain, None, || unsafe {
                Pin::new_unchecked(&mut *future_ptr).poll(cx)
            })
        });

        match poll {
            Poll::Ready(()) => {
                Self::drop_future(ptr);
                // Clear RUNNING/SCHEDULED and publish COMPLETED in one step
                // so no waker can slip in and schedule a dead task.
                loop {
                    match Self::state(ptr).compare_exchange_weak(
                        state,
                        (state & !(RUNNING | SCHEDULED)) | COMPLETED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => break,
                        Err(s) => state = s,
                    }
                }
                Self::drop_ref(ptr);
                false
            }
            Poll::Pending => {
                // Remember the worker we suspended on; the next resumption
                // checks back in preferring it.
                chain.checkout();
                loop {
                    match Self::state(ptr).compare_exchange_weak(
                        state,
                        state & !RUNNING,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(prev) => {
                            // Woken while running: the wake left SCHEDULED
                            // set without transferring a reference, so this
                            // thread reschedules with the one it holds.
                            if prev & SCHEDULED != 0 {
                                Self::schedule(ptr, ScheduleInfo::default());
                                return true;
                            }
                            Self::drop_ref(ptr);
                            return false;
                        }
                        Err(s) => state = s,
                    }
                }
            }
        }
    }
}

/// Drops the future of a record that was never run, marking it completed so
/// stray wakers neither poll nor double-drop it. Called by `Runnable::drop`.
pub(crate) unsafe fn teardown(ptr: *const ()) {
    let header = &*(ptr as *const Header);
    let mut state = header.state.load(Ordering::Acquire);
    loop {
        if state & COMPLETED != 0 {
            // Already torn down elsewhere; just release the reference.
            (header.vtable.drop_ref)(ptr);
            return;
        }
        match header.state.compare_exchange_weak(
            state,
            (state & !SCHEDULED) | COMPLETED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => break,
            Err(s) => state = s,
        }
    }
    (header.vtable.drop_future)(ptr);
    (header.vtable.drop_ref)(ptr);
}
