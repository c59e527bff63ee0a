use std::future::IntoFuture;

use lazy_promise::{
    current_executor, current_task_local, resume_by_schedule, sync_await, sync_await_via, Executor,
    Lazy, Promise, Try,
};

mod common;
use common::ThreadPool;

struct TraceId(u64);

#[test]
fn child_sees_parent_executor() {
    let pool = ThreadPool::named("inherited", 1);
    let name = sync_await_via(
        Lazy::new(async {
            let child = Lazy::new(async {
                current_executor().await.map(|e| e.name().to_string())
            });
            child.await
        }),
        pool,
    );
    assert_eq!(name.as_deref(), Some("inherited"));
}

#[test]
fn no_executor_outside_any() {
    let executor = sync_await(Lazy::new(async { current_executor().await }));
    assert!(executor.is_none());
}

#[test]
fn task_local_flows_down_the_chain() {
    let observed = sync_await(
        Lazy::new(async {
            let child = Lazy::new(async {
                let grandchild = Lazy::new(async {
                    current_task_local::<TraceId>().await.map(|t| t.0)
                });
                grandchild.await
            });
            child.await
        })
        .with_local(TraceId(99)),
    );
    assert_eq!(observed, Some(99));
}

#[test]
fn task_local_lookup_is_typed() {
    let observed = sync_await(
        Lazy::new(async { current_task_local::<String>().await }).with_local(TraceId(1)),
    );
    assert!(observed.is_none());
}

#[test]
#[should_panic(expected = "conflicting task-local")]
fn conflicting_locals_are_fatal() {
    sync_await(
        Lazy::new(async {
            let child = Lazy::new(async {}).with_local(TraceId(2));
            child.await
        })
        .with_local(TraceId(1)),
    );
}

#[test]
fn absent_local_reads_none() {
    let observed = sync_await(Lazy::new(async {
        current_task_local::<TraceId>().await.map(|t| t.0)
    }));
    assert_eq!(observed, None);
}

#[test]
fn try_unit_distinguishes_empty_from_value() {
    let empty = Try::<()>::Empty;
    let unit = Try::Value(());
    assert!(empty.is_empty());
    assert!(!empty.available());
    assert!(unit.has_value());
    assert!(unit.available());
}

#[test]
fn resume_by_schedule_hops_off_the_producer() {
    let pool = ThreadPool::new(2);
    let mut promise = Promise::new();
    let future = promise.get_future();
    let producer = std::thread::current().id();
    let target = pool.clone();

    let task = Lazy::new(async move {
        let value = resume_by_schedule(future).await;
        (value, std::thread::current().id(), target.in_current_thread())
    });

    let (tx, rx) = flume::bounded(1);
    task.via(pool.clone()).start(move |result| {
        tx.send(result.into_result().unwrap()).unwrap();
    });

    std::thread::sleep(std::time::Duration::from_millis(10));
    promise.set_value(31);
    let (value, resumed_on, on_worker) = rx.recv().unwrap();
    assert_eq!(value, 31);
    assert_ne!(resumed_on, producer);
    assert!(on_worker);
}

#[test]
#[should_panic(expected = "only meaningful with an executor")]
fn yield_without_executor_is_fatal() {
    sync_await(Lazy::new(async { lazy_promise::yield_now().await }));
}

// A lazy is still an ordinary future: foreign drivers can poll it, it just
// gets a chain of its own.
#[test]
fn lazy_polls_under_foreign_block_on() {
    let value = futures_lite::future::block_on(Lazy::new(async { 6 * 7 }).into_future());
    assert_eq!(value, 42);
}
