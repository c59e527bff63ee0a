use std::sync::Arc;
use std::thread;
use std::time::Duration;

use easy_parallel::Parallel;
use lazy_promise::{
    collect_all_futures, make_error_future, make_ready_future, Error, Executor, Func, Promise,
    Try,
};

mod common;
use common::ThreadPool;

#[test]
fn set_value_then_get() {
    let mut promise = Promise::new();
    let future = promise.get_future();
    promise.set_value(42);
    assert!(future.has_result());
    assert_eq!(future.get(), 42);
}

#[test]
fn get_blocks_until_value() {
    let mut promise = Promise::new();
    let future = promise.get_future();
    let (got, ()) = Parallel::new()
        .add(move || future.get())
        .finish(move || {
            thread::sleep(Duration::from_millis(50));
            promise.set_value(13);
        });
    assert_eq!(got, vec![13]);
}

#[test]
fn dropped_promise_breaks_the_future() {
    let mut promise = Promise::<i32>::new();
    let future = promise.get_future();
    drop(promise);
    assert!(future.has_result());
    match future.result() {
        Try::Error(Error::BrokenPromise) => {}
        other => panic!("expected a broken promise, got {:?}", other),
    }
}

#[test]
#[should_panic(expected = "already has a future")]
fn second_future_is_refused() {
    let mut promise = Promise::<i32>::new();
    let _first = promise.get_future();
    let _second = promise.get_future();
}

#[test]
fn ready_future_roundtrip() {
    assert_eq!(make_ready_future(5).get(), 5);
}

#[test]
fn error_future_carries_error() {
    let future = make_error_future::<i32>(Error::ScheduleFailed);
    match future.result() {
        Try::Error(Error::ScheduleFailed) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn then_value_chains() {
    let mut promise = Promise::new();
    let chained = promise.get_future().then_value(|v: i32| v * 2);
    promise.set_value(21);
    assert_eq!(chained.get(), 42);
}

#[test]
fn then_value_skips_on_error() {
    let mut promise = Promise::<i32>::new();
    let chained = promise.get_future().then_value(|_| unreachable!());
    promise.set_error(Error::ScheduleFailed);
    match chained.result() {
        Try::Error(Error::ScheduleFailed) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn then_try_always_runs() {
    let mut promise = Promise::<i32>::new();
    let chained = promise
        .get_future()
        .then_try(|result| result.has_error());
    promise.set_error(Error::ScheduleFailed);
    assert!(chained.get());
}

#[test]
fn via_last_executor_wins() {
    let first = ThreadPool::named("first", 1);
    let second = ThreadPool::named("second", 1);
    let mut promise = Promise::<i32>::new();
    let future = promise
        .get_future()
        .via(first)
        .via(second.clone());
    let executor = future.executor().unwrap();
    let second: Arc<dyn Executor> = second;
    assert!(Arc::ptr_eq(&executor, &second));
}

#[test]
fn continuation_prefers_checked_out_context() {
    let pool = ThreadPool::new(2);
    let (tx, rx) = flume::bounded(1);
    let mut promise = Promise::<i32>::new();
    let future = promise.get_future().via(pool.clone());
    {
        let pool = pool.clone();
        future.then_value(move |v| {
            tx.send((v, pool.in_current_thread())).unwrap();
        });
    }
    promise.set_value(9);
    let (value, on_worker) = rx.recv().unwrap();
    assert_eq!(value, 9);
    assert!(on_worker);
}

// Scenario: three already-ready futures collect synchronously, in order.
#[test]
fn collect_ready_futures() {
    let futures = vec![
        make_ready_future(1),
        make_ready_future(2),
        make_ready_future(3),
    ];
    let aggregate = collect_all_futures(futures);
    assert!(aggregate.has_result());
    let results = aggregate.result().value_or_raise();
    let values: Vec<_> = results
        .into_iter()
        .map(|t| t.into_result().unwrap())
        .collect();
    assert_eq!(values, vec![1, 2, 3]);
}

// Scenario: one ready, two pending; the aggregate blocks, then resolves in
// input order with the error in its slot.
#[test]
fn collect_mixed_readiness() {
    let mut p1 = Promise::new();
    let mut p2 = Promise::new();
    let mut p3 = Promise::<i32>::new();
    let f1 = p1.get_future();
    let f2 = p2.get_future();
    let f3 = p3.get_future();
    p1.set_value(10);

    let aggregate = collect_all_futures(vec![f1, f2, f3]);
    let (results, ()) = Parallel::new()
        .add(move || aggregate.get())
        .finish(move || {
            thread::sleep(Duration::from_millis(20));
            p2.set_value(20);
            p3.set_error(Error::ScheduleFailed);
        });
    let results = results.into_iter().next().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_value(), Some(&10));
    assert_eq!(results[1].as_value(), Some(&20));
    assert!(matches!(results[2], Try::Error(Error::ScheduleFailed)));
}

#[test]
fn collect_empty_is_ready() {
    let aggregate = collect_all_futures(Vec::<lazy_promise::Future<i32>>::new());
    assert!(aggregate.has_result());
    assert!(aggregate.result().value_or_raise().is_empty());
}

// An executor that claims every thread as its own; `get` on it must refuse
// to block.
struct Everywhere;

impl Executor for Everywhere {
    fn schedule(&self, func: Func) -> bool {
        func();
        true
    }

    fn in_current_thread(&self) -> bool {
        true
    }
}

#[test]
#[should_panic(expected = "own executor")]
fn get_on_own_executor_is_refused() {
    let mut promise = Promise::<i32>::new();
    let future = promise.get_future().via(Arc::new(Everywhere));
    let _ = future.get();
}

#[test]
fn refused_submission_runs_continuation_inline() {
    let pool = ThreadPool::new(1);
    pool.refuse_submissions();
    let caller = thread::current().id();
    let (tx, rx) = flume::bounded(1);
    let mut promise = Promise::<i32>::new();
    let future = promise.get_future().via(pool.clone());
    promise.force_schedule();
    future.then_value(move |v| {
        tx.send((v, thread::current().id() == caller)).unwrap();
    });
    promise.set_value(3);
    let (value, inline) = rx.recv().unwrap();
    assert_eq!(value, 3);
    assert!(inline);
}
