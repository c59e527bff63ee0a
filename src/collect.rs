//! Combinators coordinating many lazy tasks.
//!
//! All of them share one shape: each input is launched as its own root
//! computation whose completion callback deposits the result and downs a
//! shared [`CountEvent`]; the awaiting task suspends on the event. The
//! shared context is kept alive by the callbacks' references, so it
//! outlives the awaiter even when the awaiter loses interest (the timeout
//! pattern: `collect_any(sleep, work)` discards the loser, which still runs
//! to completion).
//!
//! Output order always matches input order; completion order is free.

use core::cell::UnsafeCell;
use core::future::Future as CoreFuture;
use core::mem;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::count_event::CountEvent;
use crate::current::current_chain;
use crate::executor::{ExecutorRef, Func};
use crate::lazy::{yield_now, Lazy};
use crate::try_value::Try;

/// Result slots written concurrently by completion callbacks.
struct OutputSlots<T> {
    slots: Vec<UnsafeCell<Try<T>>>,
}

// SAFETY: slot `i` is written by exactly one completion callback, and read
// only after the count event reached zero, which orders every write before
// the read.
unsafe impl<T: Send> Sync for OutputSlots<T> {}

impl<T> OutputSlots<T> {
    fn new(n: usize) -> Self {
        OutputSlots {
            slots: (0..n).map(|_| UnsafeCell::new(Try::Empty)).collect(),
        }
    }

    /// Writes slot `i`. Caller must be the sole owner of that index.
    unsafe fn put(&self, i: usize, value: Try<T>) {
        *self.slots[i].get() = value;
    }

    /// Takes every slot. Caller must have observed the event finishing.
    unsafe fn take_all(&self) -> Vec<Try<T>> {
        self.slots
            .iter()
            .map(|slot| mem::replace(&mut *slot.get(), Try::Empty))
            .collect()
    }
}

struct AllContext<T> {
    outputs: OutputSlots<T>,
    event: CountEvent,
}

impl<T: Send> AllContext<T> {
    fn complete(&self, i: usize, value: Try<T>) {
        // SAFETY: index `i` belongs to this completion alone.
        unsafe {
            self.outputs.put(i, value);
        }
        if let Some(waker) = self.event.down(1) {
            waker.wake();
        }
    }
}

/// Runs `start` through `executor` when offloading is requested, degrading
/// to running it in place when the executor is absent or refuses.
fn submit_or_inline(
    executor: Option<ExecutorRef>,
    offload: bool,
    start: impl FnOnce() + Send + 'static,
) {
    if offload {
        if let Some(executor) = executor {
            let cell = Arc::new(Mutex::new(Some(start)));
            let job: Func = {
                let cell = cell.clone();
                Box::new(move || {
                    let start = cell.lock().unwrap().take();
                    if let Some(start) = start {
                        start();
                    }
                })
            };
            if executor.schedule(job) {
                return;
            }
            let start = cell.lock().unwrap().take();
            if let Some(start) = start {
                start();
            }
            return;
        }
    }
    start();
}

/// Awaits every task, one after another: each task is started from its
/// predecessor's completion, so completions are strictly sequential.
///
/// The output has one [`Try`] per input, index-matched; individual errors
/// land in their slots and never abort the aggregate.
pub fn collect_all<T: Send + 'static>(input: Vec<Lazy<T>>) -> CollectAllAwaiter<T> {
    CollectAllAwaiter {
        input,
        parallel: false,
        ctx: None,
    }
}

/// Awaits every task concurrently: tasks with their own executor are
/// submitted there, the rest run interleaved on the awaiting chain.
///
/// Same output contract as [`collect_all`].
pub fn collect_all_para<T: Send + 'static>(input: Vec<Lazy<T>>) -> CollectAllAwaiter<T> {
    CollectAllAwaiter {
        input,
        parallel: true,
        ctx: None,
    }
}

/// Awaiter returned by [`collect_all`] and [`collect_all_para`].
#[must_use = "combinators do nothing until awaited"]
pub struct CollectAllAwaiter<T: Send + 'static> {
    input: Vec<Lazy<T>>,
    parallel: bool,
    ctx: Option<Arc<AllContext<T>>>,
}

struct SerialState<T: Send + 'static> {
    queue: Mutex<VecDeque<(usize, Lazy<T>)>>,
    executor: Option<ExecutorRef>,
    ctx: Arc<AllContext<T>>,
}

fn launch_next_serial<T: Send + 'static>(state: Arc<SerialState<T>>) {
    let next = state.queue.lock().unwrap().pop_front();
    let (i, mut lazy) = match next {
        Some(next) => next,
        None => return,
    };
    if lazy.executor().is_none() {
        lazy.set_executor(state.executor.clone());
    }
    let executor = state.executor.clone();
    let job = move || {
        let state_cb = state;
        lazy.start(move |value| {
            state_cb.ctx.complete(i, value);
            launch_next_serial(state_cb.clone());
        });
    };
    submit_or_inline(executor, true, job);
}

impl<T: Send + 'static> CoreFuture for CollectAllAwaiter<T> {
    type Output = Vec<Try<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Vec<Try<T>>> {
        let this = self.get_mut();

        if let Some(ctx) = &this.ctx {
            ctx.event.set_awaiter(cx.waker());
            if ctx.event.finished() {
                // SAFETY: the event finished, so all slots were written.
                return Poll::Ready(unsafe { ctx.outputs.take_all() });
            }
            return Poll::Pending;
        }

        let n = this.input.len();
        if n == 0 {
            return Poll::Ready(Vec::new());
        }

        let ctx = Arc::new(AllContext {
            outputs: OutputSlots::new(n),
            event: CountEvent::new(n),
        });
        this.ctx = Some(ctx.clone());
        ctx.event.set_awaiter(cx.waker());

        let chain_executor = current_chain().and_then(|chain| chain.executor());
        let input = mem::take(&mut this.input);

        if this.parallel {
            for (i, mut lazy) in input.into_iter().enumerate() {
                if lazy.executor().is_none() {
                    lazy.set_executor(chain_executor.clone());
                }
                let executor = lazy.executor();
                let ctx_cb = ctx.clone();
                let start = move || {
                    lazy.start(move |value| ctx_cb.complete(i, value));
                };
                submit_or_inline(executor, n > 1, start);
            }
        } else {
            let state = Arc::new(SerialState {
                queue: Mutex::new(input.into_iter().enumerate().collect()),
                executor: chain_executor,
                ctx: ctx.clone(),
            });
            launch_next_serial(state);
        }

        // Release the awaiting side's unit; if everything already finished,
        // this wakes the registered waker.
        if let Some(waker) = ctx.event.down(1) {
            waker.wake();
        }
        Poll::Pending
    }
}

/// Processes the input in batches of at most `max_concurrency`, awaiting
/// each batch with [`collect_all`] (strictly sequential within a batch),
/// optionally yielding between batches. Output order matches input order.
///
/// `max_concurrency == 0`, or an input that fits in one batch, behaves
/// exactly like the unwindowed combinator.
pub async fn collect_all_windowed<T: Send + 'static>(
    max_concurrency: usize,
    yield_between: bool,
    input: Vec<Lazy<T>>,
) -> Vec<Try<T>> {
    collect_windowed_impl(max_concurrency, yield_between, input, false).await
}

/// [`collect_all_windowed`] with concurrent batches ([`collect_all_para`]).
pub async fn collect_all_windowed_para<T: Send + 'static>(
    max_concurrency: usize,
    yield_between: bool,
    input: Vec<Lazy<T>>,
) -> Vec<Try<T>> {
    collect_windowed_impl(max_concurrency, yield_between, input, true).await
}

async fn collect_windowed_impl<T: Send + 'static>(
    max_concurrency: usize,
    yield_between: bool,
    input: Vec<Lazy<T>>,
    parallel: bool,
) -> Vec<Try<T>> {
    let collect = |batch| CollectAllAwaiter {
        input: batch,
        parallel,
        ctx: None,
    };
    let n = input.len();
    if max_concurrency == 0 || n <= max_concurrency {
        return collect(input).await;
    }
    let mut output = Vec::with_capacity(n);
    let mut rest = input.into_iter();
    loop {
        let batch: Vec<_> = rest.by_ref().take(max_concurrency).collect();
        if batch.is_empty() {
            break;
        }
        output.extend(collect(batch).await);
        if yield_between {
            yield_now().await;
        }
    }
    output
}

/// Winner of a [`collect_any`] race.
#[derive(Debug)]
pub struct CollectAnyResult<T> {
    /// Index of the first input to complete, or `usize::MAX` for an empty
    /// race.
    pub index: usize,
    /// That input's result.
    pub value: Try<T>,
}

struct AnyContext<T> {
    event: CountEvent,
    n: usize,
    winner: Mutex<Option<(usize, Try<T>)>>,
    done: AtomicBool,
}

impl<T> AnyContext<T> {
    fn new(n: usize) -> Arc<Self> {
        Arc::new(AnyContext {
            event: CountEvent::new(n),
            n,
            winner: Mutex::new(None),
            done: AtomicBool::new(false),
        })
    }

    /// Returns `true` iff this completion is the first.
    fn arrive(&self) -> bool {
        self.event.down_count(1) == self.n + 1
    }

    fn finish(&self, index: usize, value: Try<T>) {
        *self.winner.lock().unwrap() = Some((index, value));
        self.done.store(true, Ordering::Release);
        if let Some(waker) = self.event.take_awaiter() {
            waker.wake();
        }
    }
}

/// Races the tasks; the first to complete wins and its result is returned
/// together with its index. The losers run to completion and their results
/// are discarded — the shared context stays alive through their callbacks.
pub fn collect_any<T: Send + 'static>(input: Vec<Lazy<T>>) -> CollectAnyAwaiter<T> {
    CollectAnyAwaiter { input, ctx: None }
}

/// Awaiter returned by [`collect_any`].
#[must_use = "combinators do nothing until awaited"]
pub struct CollectAnyAwaiter<T: Send + 'static> {
    input: Vec<Lazy<T>>,
    ctx: Option<Arc<AnyContext<T>>>,
}

impl<T: Send + 'static> CoreFuture for CollectAnyAwaiter<T> {
    type Output = CollectAnyResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CollectAnyResult<T>> {
        let this = self.get_mut();

        if let Some(ctx) = &this.ctx {
            ctx.event.set_awaiter(cx.waker());
            if ctx.done.load(Ordering::Acquire) {
                let (index, value) = ctx.winner.lock().unwrap().take().expect("winner consumed twice");
                return Poll::Ready(CollectAnyResult { index, value });
            }
            return Poll::Pending;
        }

        let n = this.input.len();
        if n == 0 {
            return Poll::Ready(CollectAnyResult {
                index: usize::MAX,
                value: Try::Empty,
            });
        }

        let ctx = AnyContext::new(n);
        this.ctx = Some(ctx.clone());
        ctx.event.set_awaiter(cx.waker());

        let chain_executor = current_chain().and_then(|chain| chain.executor());
        let input = mem::take(&mut this.input);
        for (i, mut lazy) in input.into_iter().enumerate() {
            if ctx.done.load(Ordering::Acquire) {
                break;
            }
            if lazy.executor().is_none() {
                lazy.set_executor(chain_executor.clone());
            }
            let ctx_cb = ctx.clone();
            lazy.start(move |value| {
                if ctx_cb.arrive() {
                    ctx_cb.finish(i, value);
                }
            });
        }
        Poll::Pending
    }
}

/// [`collect_any`] delivering the winner through `callback`, which runs
/// exactly once with the winning index and result; the returned awaiter
/// resolves to the index.
pub fn collect_any_with_callback<T, F>(
    input: Vec<Lazy<T>>,
    callback: F,
) -> CollectAnyCallbackAwaiter<T, F>
where
    T: Send + 'static,
    F: FnOnce(usize, Try<T>) + Send + 'static,
{
    CollectAnyCallbackAwaiter {
        input,
        callback: Some(callback),
        ctx: None,
    }
}

/// Awaiter returned by [`collect_any_with_callback`].
#[must_use = "combinators do nothing until awaited"]
pub struct CollectAnyCallbackAwaiter<T, F>
where
    T: Send + 'static,
    F: FnOnce(usize, Try<T>) + Send + 'static,
{
    input: Vec<Lazy<T>>,
    callback: Option<F>,
    ctx: Option<Arc<AnyContext<()>>>,
}

impl<T, F> Unpin for CollectAnyCallbackAwaiter<T, F>
where
    T: Send + 'static,
    F: FnOnce(usize, Try<T>) + Send + 'static,
{
}

impl<T, F> CoreFuture for CollectAnyCallbackAwaiter<T, F>
where
    T: Send + 'static,
    F: FnOnce(usize, Try<T>) + Send + 'static,
{
    type Output = usize;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<usize> {
        let this = self.get_mut();

        if let Some(ctx) = &this.ctx {
            ctx.event.set_awaiter(cx.waker());
            if ctx.done.load(Ordering::Acquire) {
                let (index, _) = ctx.winner.lock().unwrap().take().expect("winner consumed twice");
                return Poll::Ready(index);
            }
            return Poll::Pending;
        }

        let n = this.input.len();
        if n == 0 {
            return Poll::Ready(usize::MAX);
        }

        let ctx = AnyContext::<()>::new(n);
        this.ctx = Some(ctx.clone());
        ctx.event.set_awaiter(cx.waker());

        let callback = Arc::new(Mutex::new(this.callback.take()));
        let chain_executor = current_chain().and_then(|chain| chain.executor());
        let input = mem::take(&mut this.input);
        for (i, mut lazy) in input.into_iter().enumerate() {
            if ctx.done.load(Ordering::Acquire) {
                break;
            }
            if lazy.executor().is_none() {
                lazy.set_executor(chain_executor.clone());
            }
            let ctx_cb = ctx.clone();
            let callback = callback.clone();
            lazy.start(move |value| {
                if ctx_cb.arrive() {
                    let callback = callback.lock().unwrap().take();
                    if let Some(callback) = callback {
                        callback(i, value);
                    }
                    ctx_cb.finish(i, Try::Value(()));
                }
            });
        }
        Poll::Pending
    }
}

/// [`collect_any`] over task/callback pairs: the winning task's callback
/// runs with its result, the losers' callbacks never run. Resolves to the
/// winner's index.
pub fn collect_any_pair<T, C>(input: Vec<(Lazy<T>, C)>) -> CollectAnyPairAwaiter<T, C>
where
    T: Send + 'static,
    C: FnOnce(Try<T>) + Send + 'static,
{
    CollectAnyPairAwaiter { input, ctx: None }
}

/// Awaiter returned by [`collect_any_pair`].
#[must_use = "combinators do nothing until awaited"]
pub struct CollectAnyPairAwaiter<T, C>
where
    T: Send + 'static,
    C: FnOnce(Try<T>) + Send + 'static,
{
    input: Vec<(Lazy<T>, C)>,
    ctx: Option<Arc<AnyContext<()>>>,
}

impl<T, C> Unpin for CollectAnyPairAwaiter<T, C>
where
    T: Send + 'static,
    C: FnOnce(Try<T>) + Send + 'static,
{
}

impl<T, C> CoreFuture for CollectAnyPairAwaiter<T, C>
where
    T: Send + 'static,
    C: FnOnce(Try<T>) + Send + 'static,
{
    type Output = usize;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<usize> {
        let this = self.get_mut();

        if let Some(ctx) = &this.ctx {
            ctx.event.set_awaiter(cx.waker());
            if ctx.done.load(Ordering::Acquire) {
                let (index, _) = ctx.winner.lock().unwrap().take().expect("winner consumed twice");
                return Poll::Ready(index);
            }
            return Poll::Pending;
        }

        let n = this.input.len();
        if n == 0 {
            return Poll::Ready(usize::MAX);
        }

        let ctx = AnyContext::<()>::new(n);
        this.ctx = Some(ctx.clone());
        ctx.event.set_awaiter(cx.waker());

        let chain_executor = current_chain().and_then(|chain| chain.executor());
        let input = mem::take(&mut this.input);
        for (i, (mut lazy, callback)) in input.into_iter().enumerate() {
            if ctx.done.load(Ordering::Acquire) {
                break;
            }
            if lazy.executor().is_none() {
                lazy.set_executor(chain_executor.clone());
            }
            let ctx_cb = ctx.clone();
            lazy.start(move |value| {
                if ctx_cb.arrive() {
                    callback(value);
                    ctx_cb.finish(i, Try::Value(()));
                }
            });
        }
        Poll::Pending
    }
}

/// Fixed-arity [`collect_all`]: awaits a tuple of lazy tasks sequentially,
/// producing a tuple of [`Try`] values.
pub fn collect_all_tuple<T: LazyTuple>(tasks: T) -> T::Awaiter {
    tasks.collect(false)
}

/// Fixed-arity [`collect_all_para`]: awaits a tuple of lazy tasks
/// concurrently, producing a tuple of [`Try`] values.
pub fn collect_all_tuple_para<T: LazyTuple>(tasks: T) -> T::Awaiter {
    tasks.collect(true)
}

/// Tuples of lazy tasks accepted by [`collect_all_tuple`]. Implemented for
/// arities 1 through 8.
pub trait LazyTuple: Sized + sealed::TupleSealed {
    /// The awaiter resolving to the tuple of results.
    type Awaiter: CoreFuture;

    #[doc(hidden)]
    fn collect(self, parallel: bool) -> Self::Awaiter;
}

mod sealed {
    pub trait TupleSealed {}
}

macro_rules! lazy_tuple_impl {
    ($Awaiter:ident, $len:tt, $event:tt, $(($T:ident, $task:ident, $idx:tt)),+) => {
        impl<$($T: Send + 'static),+> sealed::TupleSealed for ($(Lazy<$T>,)+) {}

        impl<$($T: Send + 'static),+> LazyTuple for ($(Lazy<$T>,)+) {
            type Awaiter = $Awaiter<$($T),+>;

            fn collect(self, parallel: bool) -> Self::Awaiter {
                $Awaiter {
                    input: Some(self),
                    parallel,
                    ctx: None,
                }
            }
        }

        #[doc(hidden)]
        #[must_use = "combinators do nothing until awaited"]
        pub struct $Awaiter<$($T: Send + 'static),+> {
            input: Option<($(Lazy<$T>,)+)>,
            parallel: bool,
            ctx: Option<Arc<($(Mutex<Option<Try<$T>>>,)+ CountEvent)>>,
        }

        impl<$($T: Send + 'static),+> Unpin for $Awaiter<$($T),+> {}

        impl<$($T: Send + 'static),+> CoreFuture for $Awaiter<$($T),+> {
            type Output = ($(Try<$T>,)+);

            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                let this = self.get_mut();

                if let Some(ctx) = &this.ctx {
                    let event = &ctx.$event;
                    event.set_awaiter(cx.waker());
                    if event.finished() {
                        return Poll::Ready((
                            $(ctx.$idx.lock().unwrap().take().unwrap_or(Try::Empty),)+
                        ));
                    }
                    return Poll::Pending;
                }

                let ($($task,)+) =
                    this.input.take().expect("tuple awaiter polled after completion");
                let ctx = Arc::new((
                    $(Mutex::new(None::<Try<$T>>),)+
                    CountEvent::new($len),
                ));
                this.ctx = Some(ctx.clone());
                ctx.$event.set_awaiter(cx.waker());

                let chain_executor = current_chain().and_then(|chain| chain.executor());
                $(
                    {
                        let mut lazy = $task;
                        if lazy.executor().is_none() {
                            lazy.set_executor(chain_executor.clone());
                        }
                        let executor = lazy.executor();
                        let ctx_cb = ctx.clone();
                        let start = move || {
                            lazy.start(move |value| {
                                *ctx_cb.$idx.lock().unwrap() = Some(value);
                                if let Some(waker) = ctx_cb.$event.down(1) {
                                    waker.wake();
                                }
                            });
                        };
                        submit_or_inline(executor, this.parallel && $len > 1, start);
                    }
                )+

                if let Some(waker) = ctx.$event.down(1) {
                    waker.wake();
                }
                Poll::Pending
            }
        }
    };
}

lazy_tuple_impl!(CollectAllTuple1, 1, 1, (A, a, 0));
lazy_tuple_impl!(CollectAllTuple2, 2, 2, (A, a, 0), (B, b, 1));
lazy_tuple_impl!(CollectAllTuple3, 3, 3, (A, a, 0), (B, b, 1), (C, c, 2));
lazy_tuple_impl!(CollectAllTuple4, 4, 4, (A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3));
lazy_tuple_impl!(CollectAllTuple5, 5, 5, (A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3), (E, e, 4));
lazy_tuple_impl!(
    CollectAllTuple6, 6, 6,
    (A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3), (E, e, 4), (F, f, 5)
);
lazy_tuple_impl!(
    CollectAllTuple7, 7, 7,
    (A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3), (E, e, 4), (F, f, 5), (G, g, 6)
);
lazy_tuple_impl!(
    CollectAllTuple8, 8, 8,
    (A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3), (E, e, 4), (F, f, 5), (G, g, 6), (H, h, 7)
);
