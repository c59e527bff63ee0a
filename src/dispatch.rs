use core::future::Future as CoreFuture;
use core::pin::Pin;
use core::task::{Context, Poll};

use std::sync::Arc;

use crate::current::current_chain;
use crate::error::Error;
use crate::executor::ExecutorRef;

/// Suspends the current task and resumes it on `executor`, migrating the
/// whole await chain: every ancestor waiting on the current task resumes on
/// `executor` too, because resumption funnels through the chain's shared
/// executor slot.
///
/// If the chain is already on `executor` this is a no-op. If `executor`
/// refuses the submission the chain is rolled back to its previous executor
/// and [`Error::DispatchFailed`] is returned.
///
/// # Panics
///
/// Panics when called outside a lazy task.
pub fn dispatch(executor: ExecutorRef) -> DispatchAwaiter {
    DispatchAwaiter {
        target: Some(executor),
        moved: false,
    }
}

/// Awaiter returned by [`dispatch`].
pub struct DispatchAwaiter {
    target: Option<ExecutorRef>,
    moved: bool,
}

impl CoreFuture for DispatchAwaiter {
    type Output = Result<(), Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        let this = self.get_mut();
        if this.moved {
            return Poll::Ready(Ok(()));
        }
        let chain = current_chain().expect("dispatch is only allowed inside a lazy task");
        let target = this.target.take().expect("dispatch awaiter polled after completion");
        if let Some(current) = chain.executor() {
            if Arc::ptr_eq(&current, &target) {
                return Poll::Ready(Ok(()));
            }
        }
        let previous = chain.swap_executor(Some(target.clone()));
        this.moved = true;
        let waker = cx.waker().clone();
        if !target.schedule(Box::new(move || waker.wake())) {
            // The chain must not be left pointing at an executor that
            // refused it; the caller may catch the error and continue.
            chain.swap_executor(previous);
            this.moved = false;
            return Poll::Ready(Err(Error::DispatchFailed));
        }
        Poll::Pending
    }
}
