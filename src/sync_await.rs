use std::sync::{Arc, Mutex};

use crate::condition::Condition;
use crate::executor::ExecutorRef;
use crate::lazy::{Lazy, StartableTask};
use crate::try_value::Try;

/// Blocks the calling native thread until `task` completes, returning its
/// value.
///
/// # Panics
///
/// Panics when called from a worker thread of the task's own executor —
/// the task could then never be resumed and the wait would deadlock. Also
/// re-raises the task's error.
///
/// ```
/// use lazy_promise::{sync_await, Lazy};
///
/// let value = sync_await(Lazy::new(async { 1 + 2 }));
/// assert_eq!(value, 3);
/// ```
pub fn sync_await<T, L>(task: L) -> T
where
    T: Send + 'static,
    L: StartableTask<T>,
{
    sync_await_try(task).value_or_raise()
}

/// Like [`sync_await`], returning the result container instead of
/// re-raising errors.
pub fn sync_await_try<T, L>(task: L) -> Try<T>
where
    T: Send + 'static,
    L: StartableTask<T>,
{
    if let Some(executor) = task.task_executor() {
        assert!(
            !executor.in_current_thread(),
            "sync_await on the task's own executor would deadlock"
        );
    }
    let condition = Arc::new(Condition::new());
    let slot = Arc::new(Mutex::new(Try::Empty));
    {
        let condition = condition.clone();
        let slot = slot.clone();
        task.start_boxed(Box::new(move |value| {
            *slot.lock().unwrap() = value;
            condition.release();
        }));
    }
    condition.acquire();
    let result = std::mem::replace(&mut *slot.lock().unwrap(), Try::Empty);
    result
}

/// Binds `executor` to the task, then blocks on it.
pub fn sync_await_via<T: Send + 'static>(task: Lazy<T>, executor: ExecutorRef) -> T {
    sync_await(task.via(executor))
}
