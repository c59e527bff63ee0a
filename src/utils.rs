/// Calls a function and aborts the process if it panics.
///
/// Used in unsafe code where unwinding past a half-updated task record
/// cannot be recovered from.
#[inline]
pub(crate) fn abort_on_panic<T>(f: impl FnOnce() -> T) -> T {
    struct Bomb;

    impl Drop for Bomb {
        fn drop(&mut self) {
            std::process::abort();
        }
    }

    let bomb = Bomb;
    let t = f();
    core::mem::forget(bomb);
    t
}
