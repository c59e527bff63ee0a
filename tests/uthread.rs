use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lazy_promise::uthread::{self, Attribute, Launch, Uthread};
use lazy_promise::{make_ready_future, sync_await, Lazy, Promise};

mod common;
use common::ThreadPool;

fn attr(pool: &Arc<common::ThreadPool>) -> Attribute {
    Attribute {
        executor: Some(pool.clone()),
        stack_size: 0,
    }
}

#[test]
fn await_ready_future_is_immediate() {
    let pool = ThreadPool::new(1);
    let (tx, rx) = flume::bounded(1);
    let uthread_attr = attr(&pool);
    Uthread::new(uthread_attr, move || {
        tx.send(uthread::await_future(make_ready_future(5))).unwrap();
    })
    .detach();
    assert_eq!(rx.recv().unwrap(), 5);
}

#[test]
fn await_future_switches_out_and_back() {
    let pool = ThreadPool::new(2);
    let (tx, rx) = flume::bounded(1);
    let mut promise = Promise::new();
    let future = promise.get_future().via(pool.clone());

    let uthread_attr = attr(&pool);
    Uthread::new(uthread_attr, move || {
        tx.send(uthread::await_future(future)).unwrap();
    })
    .detach();

    std::thread::sleep(Duration::from_millis(20));
    promise.set_value(17);
    assert_eq!(rx.recv().unwrap(), 17);
}

#[test]
fn spawn_schedule_returns_future() {
    let pool = ThreadPool::new(2);
    let (tx, rx) = flume::bounded(1);
    let outer_attr = attr(&pool);
    let inner_attr = attr(&pool);
    Uthread::new(outer_attr, move || {
        let future = uthread::spawn(Launch::Schedule, inner_attr, || 20 + 1);
        tx.send(uthread::await_future(future)).unwrap();
    })
    .detach();
    assert_eq!(rx.recv().unwrap(), 21);
}

#[test]
fn join_runs_callback_after_finish() {
    static FINISHED: AtomicUsize = AtomicUsize::new(0);
    let pool = ThreadPool::new(1);
    let (tx, rx) = flume::bounded(1);
    let body_done = Arc::new(AtomicUsize::new(0));
    let observed = body_done.clone();
    let handle = Uthread::new(attr(&pool), move || {
        std::thread::sleep(Duration::from_millis(10));
        observed.store(1, Ordering::SeqCst);
    });
    // The body never switches out, so construction ran it to completion
    // and the join callback fires immediately.
    assert!(handle.join(move || {
        FINISHED.fetch_add(1, Ordering::SeqCst);
        tx.send(()).unwrap();
    }));
    rx.recv().unwrap();
    assert_eq!(FINISHED.load(Ordering::SeqCst), 1);
    assert_eq!(body_done.load(Ordering::SeqCst), 1);
}

#[test]
fn collect_all_gathers_in_order() {
    let pool = ThreadPool::new(4);
    let (tx, rx) = flume::bounded(1);
    let executor = pool.clone();
    Uthread::new(attr(&pool), move || {
        let funcs: Vec<_> = (0..6)
            .map(|i| {
                move || {
                    std::thread::sleep(Duration::from_millis((6 - i) as u64));
                    i
                }
            })
            .collect();
        let results = uthread::collect_all(funcs, executor, Launch::Schedule);
        tx.send(results).unwrap();
    })
    .detach();
    assert_eq!(rx.recv().unwrap(), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn collect_all_current_policy() {
    let pool = ThreadPool::new(2);
    let (tx, rx) = flume::bounded(1);
    let executor = pool.clone();
    Uthread::new(attr(&pool), move || {
        let funcs: Vec<_> = (0..3).map(|i| move || i * 2).collect();
        let results = uthread::collect_all(funcs, executor, Launch::Current);
        tx.send(results).unwrap();
    })
    .detach();
    assert_eq!(rx.recv().unwrap(), vec![0, 2, 4]);
}

#[test]
fn uthreads_interleave_with_lazies() {
    let pool = ThreadPool::new(2);
    let value = sync_await(Lazy::new(async { 4 }));
    let (tx, rx) = flume::bounded(1);
    Uthread::new(attr(&pool), move || {
        tx.send(value + uthread::await_future(make_ready_future(1)))
            .unwrap();
    })
    .detach();
    assert_eq!(rx.recv().unwrap(), 5);
}
