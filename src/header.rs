use core::sync::atomic::AtomicUsize;

use crate::raw::RootVTable;

/// The header of a root task record.
///
/// Stored first in the allocation so a type-erased pointer to the record can
/// always be read as a pointer to its header.
pub(crate) struct Header {
    /// Current state of the task: flags plus the reference count. See the
    /// `state` module.
    pub(crate) state: AtomicUsize,

    /// The virtual table with the record's type-specific operations. The
    /// waker vtable is derived from the same functions.
    pub(crate) vtable: &'static RootVTable,
}
