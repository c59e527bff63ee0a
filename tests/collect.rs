use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lazy_promise::{
    collect_all, collect_all_para, collect_all_tuple, collect_all_tuple_para,
    collect_all_windowed, collect_any, collect_any_pair, collect_any_with_callback,
    current_executor, dispatch, sleep, sync_await, sync_await_via, yield_now, Executor, Lazy, Try,
};

mod common;
use common::ThreadPool;

fn sleepy_task(index: usize, millis: u64) -> Lazy<usize> {
    Lazy::new(async move {
        sleep(Duration::from_millis(millis)).await;
        index
    })
}

fn values(results: Vec<Try<usize>>) -> Vec<usize> {
    results
        .into_iter()
        .map(|t| t.into_result().unwrap())
        .collect()
}

#[test]
fn collect_all_empty_is_immediate() {
    let results = sync_await(Lazy::new(async { collect_all(Vec::<Lazy<usize>>::new()).await }));
    assert!(results.is_empty());
}

// Scenario: two 50 ms tasks. Serial collection completes them one after
// another; parallel collection overlaps them on a two-worker pool.
#[test]
fn serial_collect_is_sequential() {
    let pool = ThreadPool::new(2);
    let start = Instant::now();
    let results = sync_await_via(
        Lazy::new(async {
            collect_all(vec![sleepy_task(0, 50), sleepy_task(1, 50)]).await
        }),
        pool,
    );
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(values(results), vec![0, 1]);
}

#[test]
fn parallel_collect_overlaps() {
    let pool = ThreadPool::new(2);
    let start = Instant::now();
    let results = sync_await_via(
        Lazy::new(async {
            collect_all_para(vec![sleepy_task(0, 50), sleepy_task(1, 50)]).await
        }),
        pool,
    );
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(100));
    assert_eq!(values(results), vec![0, 1]);
}

#[test]
fn errors_stay_in_their_slots() {
    let pool = ThreadPool::new(2);
    let tasks = vec![
        Lazy::new(async { 1usize }),
        Lazy::new(async { panic!("slot two failed") }),
        Lazy::new(async { 3usize }),
    ];
    let results = sync_await_via(
        Lazy::new(async { collect_all_para(tasks).await }),
        pool,
    );
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_value(), Some(&1));
    assert!(results[1].has_error());
    assert_eq!(results[2].as_value(), Some(&3));
}

// Scenario: the 10 ms task wins the race; the loser still runs but its
// result is discarded.
#[test]
fn collect_any_first_wins() {
    let pool = ThreadPool::new(2);
    let winner = sync_await_via(
        Lazy::new(async {
            collect_any(vec![sleepy_task(7, 10), sleepy_task(8, 100)]).await
        }),
        pool,
    );
    assert_eq!(winner.index, 0);
    assert_eq!(winner.value.into_result().unwrap(), 7);
}

#[test]
fn collect_any_callback_runs_once() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    let pool = ThreadPool::new(2);
    let index = sync_await_via(
        Lazy::new(async {
            collect_any_with_callback(
                vec![sleepy_task(7, 10), sleepy_task(8, 60)],
                |index, value| {
                    CALLS.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(index, 0);
                    assert_eq!(value.into_result().unwrap(), 7);
                },
            )
            .await
        }),
        pool,
    );
    assert_eq!(index, 0);
    // Let the loser finish; its callback must not fire.
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn collect_any_pair_runs_winning_callback() {
    static WINNER: AtomicUsize = AtomicUsize::new(usize::MAX);
    let pool = ThreadPool::new(2);
    let index = sync_await_via(
        Lazy::new(async {
            fn lost(_value: Try<usize>) {
                WINNER.store(0, Ordering::SeqCst);
            }
            fn won(_value: Try<usize>) {
                WINNER.store(1, Ordering::SeqCst);
            }
            collect_any_pair(vec![
                (sleepy_task(0, 60), lost as fn(Try<usize>)),
                (sleepy_task(1, 10), won as fn(Try<usize>)),
            ])
            .await
        }),
        pool,
    );
    assert_eq!(index, 1);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(WINNER.load(Ordering::SeqCst), 1);
}

// Scenario: five 10 ms tasks through a window of two run as at least three
// sequential batches, preserving order.
#[test]
fn windowed_preserves_order_and_batches() {
    let pool = ThreadPool::new(2);
    let tasks: Vec<_> = (0..5).map(|i| sleepy_task(i, 10)).collect();
    let start = Instant::now();
    let results = sync_await_via(
        Lazy::new(async move { collect_all_windowed(2, true, tasks).await }),
        pool,
    );
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert_eq!(values(results), vec![0, 1, 2, 3, 4]);
}

#[test]
fn tuple_collect_mixes_types() {
    let pool = ThreadPool::new(2);
    let (a, b, c) = sync_await_via(
        Lazy::new(async {
            collect_all_tuple((
                Lazy::new(async { 1i32 }),
                Lazy::new(async { "two".to_string() }),
                Lazy::new(async { 3.0f64 }),
            ))
            .await
        }),
        pool,
    );
    assert_eq!(a.into_result().unwrap(), 1);
    assert_eq!(b.into_result().unwrap(), "two");
    assert_eq!(c.into_result().unwrap(), 3.0);
}

#[test]
fn tuple_collect_para_overlaps() {
    let pool = ThreadPool::new(2);
    let start = Instant::now();
    let (a, b) = sync_await_via(
        Lazy::new(async {
            collect_all_tuple_para((sleepy_task(0, 50), sleepy_task(1, 50))).await
        }),
        pool,
    );
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(a.into_result().unwrap(), 0);
    assert_eq!(b.into_result().unwrap(), 1);
}

// Scenario: after a dispatch the task (and everything awaiting it) runs on
// the target executor.
#[test]
fn dispatch_migrates_the_chain() {
    let first = ThreadPool::named("first", 1);
    let second = ThreadPool::named("second", 1);
    let target = second.clone();
    let observed = sync_await_via(
        Lazy::new(async move {
            let before = current_executor().await.unwrap();
            dispatch(target.clone()).await.unwrap();
            let after = current_executor().await.unwrap();
            (
                before.name().to_string(),
                after.name().to_string(),
                target.in_current_thread(),
            )
        }),
        first,
    );
    assert_eq!(observed.0, "first");
    assert_eq!(observed.1, "second");
    assert!(observed.2);
}

#[test]
fn dispatch_to_refusing_executor_fails() {
    let first = ThreadPool::named("first", 1);
    let second = ThreadPool::named("second", 1);
    second.refuse_submissions();
    let target = second.clone();
    let outcome = sync_await_via(
        Lazy::new(async move {
            let error = dispatch(target).await.unwrap_err();
            let still = current_executor().await.unwrap().name().to_string();
            (error, still)
        }),
        first,
    );
    assert!(matches!(outcome.0, lazy_promise::Error::DispatchFailed));
    assert_eq!(outcome.1, "first");
}

#[test]
fn yield_now_lets_queued_work_run() {
    let pool = ThreadPool::new(1);
    let counter = Arc::new(AtomicUsize::new(0));
    let observed = {
        let counter = counter.clone();
        let pool_for_task = pool.clone();
        sync_await_via(
            Lazy::new(async move {
                // Queue a job behind this task, then yield to it.
                let other = counter.clone();
                pool_for_task.schedule(Box::new(move || {
                    other.store(1, Ordering::SeqCst);
                }));
                yield_now().await;
                counter.load(Ordering::SeqCst)
            }),
            pool,
        )
    };
    assert_eq!(observed, 1);
}
