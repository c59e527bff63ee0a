use core::fmt;

use crate::error::Error;

/// A result container: either nothing yet, a computed value, or an error.
///
/// `Try` is the unit of data that flows between producers and consumers in
/// this crate: a task body's outcome, a promise's payload, and the element
/// type of every collect combinator's output.
///
/// Unlike `Result`, a `Try` has a third state, [`Empty`], so a slot can exist
/// before its value does. For `Try<()>` the `Empty` and `Value(())` states
/// are distinct, which matters to the rendezvous machinery.
///
/// `Try` is move-only; consuming accessors take `self`.
///
/// [`Empty`]: Try::Empty
#[derive(Default)]
pub enum Try<T> {
    /// No value has been produced yet.
    #[default]
    Empty,
    /// The computed value.
    Value(T),
    /// The captured error.
    Error(Error),
}

impl<T> Try<T> {
    /// Wraps a computed value.
    pub fn value(value: T) -> Self {
        Try::Value(value)
    }

    /// Wraps an error.
    pub fn error(error: Error) -> Self {
        Try::Error(error)
    }

    /// Returns `true` if a value or an error is present.
    pub fn available(&self) -> bool {
        !matches!(self, Try::Empty)
    }

    /// Returns `true` if no value has been produced yet.
    pub fn is_empty(&self) -> bool {
        matches!(self, Try::Empty)
    }

    /// Returns `true` if a value is present.
    pub fn has_value(&self) -> bool {
        matches!(self, Try::Value(_))
    }

    /// Returns `true` if an error is present.
    pub fn has_error(&self) -> bool {
        matches!(self, Try::Error(_))
    }

    /// Borrows the value, if present.
    pub fn as_value(&self) -> Option<&T> {
        match self {
            Try::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Borrows the error, if present.
    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Try::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Consumes the container and returns the value.
    ///
    /// # Panics
    ///
    /// Re-raises the stored error (resuming the unwind for captured panics),
    /// and panics if no result was ever produced.
    pub fn value_or_raise(self) -> T {
        match self {
            Try::Value(v) => v,
            Try::Error(e) => e.rethrow(),
            Try::Empty => panic!("try value is unset"),
        }
    }

    /// Consumes the container, converting it into a `Result`.
    ///
    /// # Panics
    ///
    /// Panics if no result was ever produced.
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Try::Value(v) => Ok(v),
            Try::Error(e) => Err(e),
            Try::Empty => panic!("try value is unset"),
        }
    }
}

impl<T> From<Result<T, Error>> for Try<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(v) => Try::Value(v),
            Err(e) => Try::Error(e),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Try<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Try::Empty => f.write_str("Empty"),
            Try::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Try::Error(e) => f.debug_tuple("Error").field(e).finish(),
        }
    }
}
