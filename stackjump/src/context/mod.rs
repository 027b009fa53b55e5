#[cfg(target_family = "unix")]
mod unix;
#[cfg(target_family = "windows")]
mod windows;

#[cfg(target_family = "unix")]
pub use self::unix::*;

#[cfg(target_family = "windows")]
pub use self::windows::*;

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::thread;

use tracing::error;

/// Function a coroutine starts executing on its first switch-in. It receives the user data the
/// coroutine was created with and must never return, the only way out is switching to another
/// context.
pub type EntryPoint = fn(*mut c_void) -> !;

/// Upper bound for the initial frame written to a new stack. The frame is a handful of words on
/// every supported architecture, anything bigger means the capture went wrong.
pub const MAX_INITIAL_FRAME: usize = 512;

/// Lifecycle of a [`Context`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextState {
    /// Created, the entry point didn't run yet.
    Captured,
    /// Ran at least once and is currently switched away from.
    Suspended,
    /// Currently executing on its thread.
    Active,
}

/// Stack dimensions of a created context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackSize {
    /// Reserved address space. Rounded up to the page size on unix, reported as requested on
    /// Windows where the fiber API rounds it internally.
    pub reserved: usize,
    /// Part of the reservation known to be backed by physical memory.
    pub committed: usize,
}

// Runs on the new stack. A panic can't unwind past this frame, there is nothing to return to.
fn run_entry(entry: EntryPoint, user_data: *mut c_void) -> ! {
    let result: thread::Result<()> = panic::catch_unwind(AssertUnwindSafe(|| {
        entry(user_data);
    }));
    if let Err(payload) = result {
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<unknown>");
        error!(message, "panic escaped a coroutine entry point, aborting");
    }
    process::abort()
}
