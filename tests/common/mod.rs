//! A small thread-pool executor shared by the integration tests.
//!
//! Workers pull from a shared injector queue plus a private per-worker
//! queue that `checkin` targets, so context-preferring submissions land on
//! the worker they checked out from. Nothing ever runs eagerly on the
//! submitting thread, which trivially satisfies the yield-priority rule.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lazy_promise::{Executor, Func, SchedContext, ScheduleInfo, ScheduleOptions};

pub struct ThreadPool {
    name: String,
    injector: flume::Sender<Func>,
    worker_queues: Vec<flume::Sender<Func>>,
    worker_ids: Vec<thread::ThreadId>,
    shutdown: AtomicBool,
}

impl ThreadPool {
    pub fn new(threads: usize) -> Arc<Self> {
        Self::named("pool", threads)
    }

    pub fn named(name: &str, threads: usize) -> Arc<Self> {
        let (injector, injector_rx) = flume::unbounded::<Func>();
        let mut worker_queues = Vec::with_capacity(threads);
        let mut id_receivers = Vec::with_capacity(threads);
        for _ in 0..threads {
            let (own_tx, own_rx) = flume::unbounded::<Func>();
            let (id_tx, id_rx) = flume::bounded(1);
            let injector_rx = injector_rx.clone();
            thread::spawn(move || {
                id_tx.send(thread::current().id()).unwrap();
                loop {
                    if let Ok(job) = own_rx.try_recv() {
                        job();
                        continue;
                    }
                    match injector_rx.recv_timeout(Duration::from_millis(1)) {
                        Ok(job) => job(),
                        Err(flume::RecvTimeoutError::Timeout) => continue,
                        Err(flume::RecvTimeoutError::Disconnected) => {
                            while let Ok(job) = own_rx.try_recv() {
                                job();
                            }
                            break;
                        }
                    }
                }
            });
            worker_queues.push(own_tx);
            id_receivers.push(id_rx);
        }
        let worker_ids = id_receivers.iter().map(|rx| rx.recv().unwrap()).collect();
        Arc::new(ThreadPool {
            name: name.to_string(),
            injector,
            worker_queues,
            worker_ids,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Makes every later submission fail, as a shutting-down executor
    /// would.
    pub fn refuse_submissions(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn worker_index(&self) -> Option<usize> {
        let current = thread::current().id();
        self.worker_ids.iter().position(|id| *id == current)
    }
}

impl Executor for ThreadPool {
    fn schedule(&self, func: Func) -> bool {
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        self.injector.send(func).is_ok()
    }

    fn schedule_after(&self, func: Func, delay: Duration, _info: ScheduleInfo) -> bool {
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let injector = self.injector.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            let _ = injector.send(func);
        });
        true
    }

    fn in_current_thread(&self) -> bool {
        self.worker_index().is_some()
    }

    fn checkout(&self) -> SchedContext {
        match self.worker_index() {
            Some(index) => SchedContext::from_id(index as u64 + 1),
            None => SchedContext::NONE,
        }
    }

    fn checkin(&self, func: Func, ctx: SchedContext, opts: ScheduleOptions) -> bool {
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        if ctx.is_none() {
            return self.schedule(func);
        }
        let index = (ctx.id() - 1) as usize;
        if index >= self.worker_queues.len() {
            return self.schedule(func);
        }
        if opts.prompt && self.worker_index() == Some(index) {
            func();
            return true;
        }
        self.worker_queues[index].send(func).is_ok()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
