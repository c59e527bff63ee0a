//! The contract between this crate and an I/O-capable executor.
//!
//! This crate never performs I/O itself; an executor may expose a sibling
//! component accepting read/write submissions whose completions are
//! delivered to a callback with a result code. Only the contract is fixed
//! here — implementations live with the executors.

/// Completion callback: receives the operation's result code, which is the
/// transferred byte count on success or a negated OS error.
pub type IoCallback = Box<dyn FnOnce(i32) + Send + 'static>;

/// A buffer slice for scatter/gather submissions.
#[derive(Debug, Clone, Copy)]
pub struct IoSlice {
    /// Start of the buffer.
    pub ptr: *mut u8,
    /// Length of the buffer in bytes.
    pub len: usize,
}

unsafe impl Send for IoSlice {}

/// Asynchronous I/O submission surface.
///
/// All operations are submit-and-forget: the callback is invoked exactly
/// once when the operation completes, on a thread of the implementation's
/// choosing.
pub trait IoExecutor: Send + Sync {
    /// Reads `len` bytes from `fd` at `offset` into `buf`.
    fn submit_read(&self, fd: i32, buf: *mut u8, len: usize, offset: u64, cb: IoCallback);

    /// Writes `len` bytes from `buf` to `fd` at `offset`.
    fn submit_write(&self, fd: i32, buf: *const u8, len: usize, offset: u64, cb: IoCallback);

    /// Scatter read into `slices` from `fd` at `offset`.
    fn submit_readv(&self, fd: i32, slices: Vec<IoSlice>, offset: u64, cb: IoCallback);

    /// Gather write of `slices` to `fd` at `offset`.
    fn submit_writev(&self, fd: i32, slices: Vec<IoSlice>, offset: u64, cb: IoCallback);

    /// Flushes `fd` to stable storage.
    fn submit_fsync(&self, fd: i32, cb: IoCallback);
}
