use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::io_executor::IoExecutor;

/// A schedulable closure. Takes no argument, returns nothing, runs once.
pub type Func = Box<dyn FnOnce() + Send + 'static>;

/// A shared handle to an executor.
pub type ExecutorRef = Arc<dyn Executor>;

/// Priority of a submission, encoded in the low 4 bits of a
/// [`ScheduleInfo`]. A smaller level is more important.
///
/// An executor that eagerly runs submissions on the calling thread must not
/// do so for priorities at or below [`Priority::Yield`] while other work is
/// queued, otherwise a task spinning on a lock it shares with that queued
/// work can deadlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Priority {
    /// Most urgent.
    Highest = 0x0,
    /// The priority of an unhinted submission.
    Default = 0x7,
    /// First level that must not run eagerly in-thread.
    Yield = 0x8,
    /// Least urgent.
    Lowest = 0xf,
}

/// A 64-bit scheduling hint passed alongside a submission.
///
/// The low 16 bits are reserved by this crate; the lowest 4 carry the
/// priority level. Executors are free to interpret (or ignore) the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleInfo {
    raw: u64,
}

impl ScheduleInfo {
    /// Builds an info word carrying only a priority.
    pub fn with_priority(priority: Priority) -> Self {
        ScheduleInfo {
            raw: priority as u64,
        }
    }

    /// Builds an info word from its raw representation.
    pub fn from_raw(raw: u64) -> Self {
        ScheduleInfo { raw }
    }

    /// The raw 64-bit representation.
    pub fn raw(&self) -> u64 {
        self.raw
    }

    /// The priority level in `0..=15`.
    pub fn priority_level(&self) -> u8 {
        (self.raw & 0xf) as u8
    }

    /// Whether this submission may not be run eagerly on the calling thread.
    pub fn is_lazier_than_default(&self) -> bool {
        self.priority_level() >= Priority::Yield as u8
    }
}

impl Default for ScheduleInfo {
    fn default() -> Self {
        ScheduleInfo::with_priority(Priority::Default)
    }
}

/// An opaque identifier for the worker context a submission came from.
///
/// Returned by [`Executor::checkout`]; passing it back to
/// [`Executor::checkin`] asks the executor to run the closure on the same
/// worker if possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedContext(u64);

impl SchedContext {
    /// The null context. `checkin` with this value is a plain `schedule`.
    pub const NONE: SchedContext = SchedContext(0);

    /// Builds a context from a non-zero executor-defined id.
    pub fn from_id(id: u64) -> Self {
        debug_assert!(id != 0, "context id 0 is reserved for NONE");
        SchedContext(id)
    }

    /// The executor-defined id, or 0 for the null context.
    pub fn id(&self) -> u64 {
        self.0
    }

    /// Returns `true` for the null context.
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// Options for a [`Executor::checkin`] submission.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleOptions {
    /// Whether the closure may run immediately on the calling thread when
    /// the caller is already on the preferred worker.
    pub prompt: bool,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        ScheduleOptions { prompt: true }
    }
}

/// A snapshot of an executor's load.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorStat {
    /// Number of submitted closures not yet run.
    pub pending_task_count: usize,
}

/// The scheduling surface this crate builds on.
///
/// The library never spawns threads of its own; all concurrency comes from
/// the executor the application plugs in. An implementation only has to
/// provide [`schedule`] and the thread/timer queries; everything else has a
/// reasonable default.
///
/// `schedule` returning `false` means the submission was refused and the
/// closure was dropped; callers in this crate degrade to running the
/// affected continuation on the current thread. If `schedule` returns
/// `true` the executor must run the closure exactly once.
///
/// [`schedule`]: Executor::schedule
pub trait Executor: Send + Sync {
    /// Submits a closure. Returns `false` if the submission was refused.
    fn schedule(&self, func: Func) -> bool;

    /// Submits a closure with a scheduling hint. See [`ScheduleInfo`].
    fn schedule_with_info(&self, func: Func, info: ScheduleInfo) -> bool {
        let _ = info;
        self.schedule(func)
    }

    /// Submits a closure to run after `delay`.
    ///
    /// The default implementation parks a throwaway thread; real executors
    /// are expected to override this with their timer wheel.
    fn schedule_after(&self, func: Func, delay: Duration, info: ScheduleInfo) -> bool {
        let _ = info;
        thread::Builder::new()
            .name("lazy-promise-timer".into())
            .spawn(move || {
                thread::sleep(delay);
                func();
            })
            .is_ok()
    }

    /// Returns `true` if the calling thread is one of this executor's
    /// workers.
    fn in_current_thread(&self) -> bool;

    /// Captures an identifier for the current worker context, so a later
    /// [`checkin`] can prefer the same worker.
    ///
    /// [`checkin`]: Executor::checkin
    fn checkout(&self) -> SchedContext {
        SchedContext::NONE
    }

    /// Submits a closure preferring the worker identified by `ctx`.
    fn checkin(&self, func: Func, ctx: SchedContext, opts: ScheduleOptions) -> bool {
        let _ = (ctx, opts);
        self.schedule(func)
    }

    /// A human-readable name for diagnostics.
    fn name(&self) -> &str {
        "default"
    }

    /// A snapshot of the executor's load.
    fn stat(&self) -> ExecutorStat {
        ExecutorStat::default()
    }

    /// The sibling component accepting asynchronous I/O submissions, if this
    /// executor offers one.
    fn io_executor(&self) -> Option<&dyn IoExecutor> {
        None
    }
}
