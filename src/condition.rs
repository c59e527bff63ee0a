use std::sync::{Condvar, Mutex};

/// A one-shot binary semaphore for blocking a native thread on an async
/// completion.
pub(crate) struct Condition {
    released: Mutex<bool>,
    cvar: Condvar,
}

impl Condition {
    pub(crate) fn new() -> Self {
        Condition {
            released: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    pub(crate) fn release(&self) {
        *self.released.lock().unwrap() = true;
        self.cvar.notify_one();
    }

    pub(crate) fn acquire(&self) {
        let mut released = self.released.lock().unwrap();
        while !*released {
            released = self.cvar.wait(released).unwrap();
        }
    }
}
