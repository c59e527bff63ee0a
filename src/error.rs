use core::any::Any;
use core::fmt;

use std::panic::resume_unwind;

/// Payload of a panic captured from a task body.
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// Errors carried through [`Try`] values.
///
/// Only recoverable conditions live here. Structural misuse of the API
/// (setting a result twice, consuming an invalid handle, conflicting
/// task-locals) panics instead, because those are programming errors that no
/// caller can meaningfully handle.
///
/// [`Try`]: crate::Try
#[derive(thiserror::Error)]
pub enum Error {
    /// The producer side was dropped without ever setting a result.
    #[error("broken promise")]
    BrokenPromise,

    /// An executor refused a submission.
    #[error("schedule failed")]
    ScheduleFailed,

    /// The target executor of a dispatch refused the task.
    #[error("dispatch to executor failed")]
    DispatchFailed,

    /// The task body panicked; the payload is preserved so that a consuming
    /// accessor can resume the unwind.
    #[error("task panicked: {}", panic_message(.0))]
    Panic(PanicPayload),
}

impl Error {
    /// Re-raises this error on the current thread.
    ///
    /// Captured panics resume unwinding with their original payload, so a
    /// panic that crossed a task boundary looks exactly like a local one.
    pub fn rethrow(self) -> ! {
        match self {
            Error::Panic(payload) => resume_unwind(payload),
            other => panic!("{}", other),
        }
    }

    /// Returns `true` if this error is a captured panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, Error::Panic(_))
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BrokenPromise => f.write_str("BrokenPromise"),
            Error::ScheduleFailed => f.write_str("ScheduleFailed"),
            Error::DispatchFailed => f.write_str("DispatchFailed"),
            Error::Panic(payload) => f
                .debug_tuple("Panic")
                .field(&panic_message(payload))
                .finish(),
        }
    }
}

/// Best-effort extraction of a panic message for display.
fn panic_message(payload: &PanicPayload) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<opaque panic payload>"
    }
}
