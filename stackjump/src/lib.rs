//! Stackjump provides the platform half of cooperative coroutines: execution contexts that own a
//! stack and can be switched to and from on a single thread.
//!
//! It consists of two backends behind one [`Context`] type:
//! 1. On unix, [guarded stacks](stack/struct.GuardedStack.html) reserved with `mmap` and a small
//!    per-architecture assembly shim that swaps stack pointers (x86_64 and AArch64).
//! 2. On Windows, native fibers. The OS takes care of stacks and register state.
//!
//! ## Example
//! ```
//! use std::ffi::c_void;
//! use stackjump::{Context, ContextState};
//!
//! struct Link {
//!     origin: *mut Context,
//!     coroutine: *mut Context,
//!     value: u32,
//! }
//!
//! fn entry(data: *mut c_void) -> ! {
//!     let link = data as *mut Link;
//!     loop {
//!         unsafe {
//!             (*link).value += 1;
//!             Context::switch((*link).coroutine, (*link).origin);
//!         }
//!     }
//! }
//!
//! let link = Box::into_raw(Box::new(Link {
//!     origin: std::ptr::null_mut(),
//!     coroutine: std::ptr::null_mut(),
//!     value: 0,
//! }));
//!
//! unsafe {
//!     (*link).origin = Box::into_raw(Context::origin(std::ptr::null_mut()).unwrap());
//!     (*link).coroutine =
//!         Box::into_raw(Context::new(16 * 1024, 64 * 1024, entry, link as *mut c_void).unwrap());
//!
//!     Context::switch((*link).origin, (*link).coroutine);
//!     Context::switch((*link).origin, (*link).coroutine);
//!     assert_eq!((*link).value, 2);
//!     assert_eq!((*(*link).coroutine).state(), ContextState::Suspended);
//!
//!     drop(Box::from_raw((*link).coroutine));
//!     drop(Box::from_raw((*link).origin));
//!     drop(Box::from_raw(link));
//! }
//! ```

#[cfg(target_family = "unix")]
mod arch;
mod context;
#[cfg(target_family = "unix")]
mod sanitizer;
#[cfg(target_family = "unix")]
pub mod stack;

use std::io;

use thiserror::Error;

#[cfg(target_family = "unix")]
pub use arch::{stack_pointer, INITIAL_FRAME_SIZE};
pub use context::{Context, ContextState, EntryPoint, StackSize, MAX_INITIAL_FRAME};

/// Failures to acquire the resources backing a context. Contract violations are not errors, they
/// panic.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to reserve {size} bytes of stack memory")]
    Reserve {
        size: usize,
        #[source]
        source: io::Error,
    },
    #[error("failed to protect the stack guard pages")]
    Guard(#[source] io::Error),
    #[error("failed to decommit stack memory")]
    Decommit(#[source] io::Error),
    #[error("failed to create a fiber")]
    Fiber(#[source] io::Error),
    #[error("failed to convert the thread to a fiber")]
    ConvertThread(#[source] io::Error),
}
