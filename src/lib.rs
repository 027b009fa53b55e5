//! Handoff lets a thread hand its execution over to independently allocated stacks and take it
//! back, cooperatively and without creating OS threads.
//!
//! A thread first converts itself with [`convert_thread_to_coroutine`], which turns its native
//! stack into the *origin* coroutine. Coroutines created with [`create_coroutine`] start running
//! their entry point on the first [`switch_to_coroutine`] and keep running until they switch to
//! another coroutine themselves. An entry point never returns.
//!
//! ## Example
//! ```
//! use std::cell::Cell;
//! use std::ffi::c_void;
//! use handoff::*;
//!
//! struct Shared {
//!     origin: CoroutineHandle,
//!     counter: Cell<u32>,
//! }
//!
//! fn count(data: *mut c_void) -> ! {
//!     let shared = unsafe { &*(data as *const Shared) };
//!     loop {
//!         shared.counter.set(shared.counter.get() + 1);
//!         unsafe { switch_to_coroutine(shared.origin) };
//!     }
//! }
//!
//! let origin = convert_thread_to_coroutine(std::ptr::null_mut());
//! let shared = Shared { origin, counter: Cell::new(0) };
//! let mut coroutine = create_coroutine(
//!     DEFAULT_COMMIT_SIZE,
//!     DEFAULT_RESERVE_SIZE,
//!     count,
//!     &shared as *const Shared as *mut c_void,
//! );
//! assert!(coroutine.is_valid());
//!
//! for _ in 0..3 {
//!     unsafe { switch_to_coroutine(coroutine) };
//! }
//! assert_eq!(shared.counter.get(), 3);
//!
//! unsafe { delete_coroutine(&mut coroutine) };
//! assert!(!coroutine.is_valid());
//! convert_coroutine_to_thread();
//! ```
//!
//! ## Contract
//! Handles are plain pointers. They must only be used on the thread that created them and a
//! deleted handle must not be used again, which is why the functions taking a handle are
//! `unsafe`. Breaking the remaining rules (converting twice, deleting the active coroutine, ...)
//! is a programming error and panics. Values with destructors must not be kept alive across a
//! switch that never comes back, nothing unwinds them.

mod registry;

use std::ffi::c_void;
use std::ptr::NonNull;

use tracing::{debug, trace, warn};

use registry::Registry;
use stackjump::Context;

pub use stackjump::{ContextState, EntryPoint, Error, StackSize, MAX_INITIAL_FRAME};

/// Stack memory pre-faulted for a new coroutine unless asked otherwise.
pub const DEFAULT_COMMIT_SIZE: usize = 16 * 1024;

/// Address space reserved for a new coroutine's stack unless asked otherwise.
pub const DEFAULT_RESERVE_SIZE: usize = 1024 * 1024;

/// Weak reference to a coroutine.
///
/// Copying a handle doesn't copy the coroutine and dropping it doesn't delete it. A handle can be
/// invalid, which is what [`create_coroutine`] returns if the stack can't be allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CoroutineHandle(Option<NonNull<Context>>);

impl CoroutineHandle {
    /// The handle that refers to nothing.
    pub const INVALID: CoroutineHandle = CoroutineHandle(None);

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// Makes this handle invalid. The coroutine itself is left alone.
    pub fn reset(&mut self) {
        self.0 = None;
    }

    fn from_ptr(context: *mut Context) -> CoroutineHandle {
        CoroutineHandle(NonNull::new(context))
    }
}

impl Default for CoroutineHandle {
    fn default() -> Self {
        CoroutineHandle::INVALID
    }
}

/// Turns the calling thread's native stack into its origin coroutine and returns a handle to it.
/// Must happen once per thread before switching on it.
///
/// `user_data` is what [`coroutine_user_data`] returns while the origin is active. The returned
/// handle must never be passed to [`delete_coroutine`], use [`convert_coroutine_to_thread`].
///
/// Returns an invalid handle if the platform refuses the conversion (Windows threads that already
/// are fibers).
///
/// The bookkeeping is only released by [`convert_coroutine_to_thread`]. A thread that exits while
/// still converted leaks it, together with the origin's context.
///
/// # Panics
/// If the thread was already converted.
pub fn convert_thread_to_coroutine(user_data: *mut c_void) -> CoroutineHandle {
    assert!(
        Registry::current().is_null(),
        "convert_thread_to_coroutine called twice on the same thread"
    );

    let origin = match Context::origin(user_data) {
        Ok(origin) => origin,
        Err(error) => {
            warn!(%error, "failed to convert thread to coroutine");
            return CoroutineHandle::INVALID;
        }
    };
    let registry = Registry::install(origin);
    debug!(thread = ?std::thread::current().id(), "converted thread to coroutine");

    CoroutineHandle::from_ptr(unsafe { (*registry).origin() })
}

/// Undoes [`convert_thread_to_coroutine`] and releases the thread's bookkeeping.
///
/// # Panics
/// If the thread wasn't converted or a coroutine other than the origin is active.
pub fn convert_coroutine_to_thread() {
    let registry = Registry::current();
    assert!(
        !registry.is_null(),
        "convert_coroutine_to_thread called on a thread that was never converted"
    );
    assert!(
        unsafe { (*registry).is_origin_active() },
        "convert_coroutine_to_thread called outside of the origin coroutine"
    );

    drop(Registry::uninstall());
    debug!(thread = ?std::thread::current().id(), "converted coroutine to thread");
}

/// Creates a coroutine that runs `entry(user_data)` once it's switched to for the first time.
///
/// The stack reserves `reserve_size` bytes of address space (rounded up to the page size) between
/// two guard pages, of which the first `commit_size` bytes are backed by memory right away.
///
/// Returns an invalid handle if the stack can't be allocated, see [`try_create_coroutine`] for
/// the reason.
///
/// # Panics
/// If `commit_size` is bigger than `reserve_size`.
pub fn create_coroutine(
    commit_size: usize,
    reserve_size: usize,
    entry: EntryPoint,
    user_data: *mut c_void,
) -> CoroutineHandle {
    match try_create_coroutine(commit_size, reserve_size, entry, user_data) {
        Ok(handle) => handle,
        Err(error) => {
            warn!(%error, commit_size, reserve_size, "failed to create coroutine");
            CoroutineHandle::INVALID
        }
    }
}

/// Same as [`create_coroutine`], but reports why the stack couldn't be allocated.
pub fn try_create_coroutine(
    commit_size: usize,
    reserve_size: usize,
    entry: EntryPoint,
    user_data: *mut c_void,
) -> Result<CoroutineHandle, Error> {
    assert!(
        commit_size <= reserve_size,
        "commit size {} is bigger than reserve size {}",
        commit_size,
        reserve_size
    );

    let context = Box::into_raw(Context::new(commit_size, reserve_size, entry, user_data)?);
    debug!(?context, commit_size, reserve_size, "created coroutine");
    Ok(CoroutineHandle::from_ptr(context))
}

/// Releases the stack and bookkeeping of a coroutine and invalidates `handle`. Does nothing if
/// `handle` is already invalid.
///
/// # Safety
/// `handle` must come from [`create_coroutine`] on this thread and not be deleted already. Copies
/// of it are left dangling.
///
/// # Panics
/// If `handle` is an origin coroutine or the active coroutine.
pub unsafe fn delete_coroutine(handle: &mut CoroutineHandle) {
    let context = match handle.0.take() {
        Some(context) => context.as_ptr(),
        None => return,
    };

    assert!(
        !(*context).is_origin(),
        "origin coroutines can't be deleted, use convert_coroutine_to_thread"
    );
    let registry = Registry::current();
    if !registry.is_null() {
        assert_ne!(
            (*registry).active,
            context,
            "the active coroutine can't be deleted"
        );
    }

    drop(Box::from_raw(context));
    debug!(?context, "deleted coroutine");
}

/// Suspends the active coroutine and resumes `handle`. Returns once some coroutine switches back
/// to the caller. Does nothing if `handle` is invalid or already active.
///
/// # Safety
/// `handle` must be a live coroutine created on this thread, or its origin.
///
/// # Panics
/// If the thread wasn't converted.
pub unsafe fn switch_to_coroutine(handle: CoroutineHandle) {
    let registry = Registry::current();
    assert!(
        !registry.is_null(),
        "switch_to_coroutine called before convert_thread_to_coroutine"
    );

    let to = match handle.0 {
        Some(to) => to.as_ptr(),
        None => return,
    };
    let from = (*registry).active;
    if from == to {
        return;
    }

    trace!(?from, ?to, "switching coroutine");
    (*registry).active = to;
    Context::switch(from, to);
}

/// Returns the coroutine currently executing on this thread.
///
/// # Panics
/// If the thread wasn't converted.
pub fn current_coroutine() -> CoroutineHandle {
    let registry = Registry::current();
    assert!(
        !registry.is_null(),
        "current_coroutine called before convert_thread_to_coroutine"
    );
    CoroutineHandle::from_ptr(unsafe { (*registry).active })
}

/// Returns the user data of the coroutine currently executing on this thread.
///
/// # Panics
/// If the thread wasn't converted.
pub fn coroutine_user_data() -> *mut c_void {
    let registry = Registry::current();
    assert!(
        !registry.is_null(),
        "coroutine_user_data called before convert_thread_to_coroutine"
    );
    unsafe { (*(*registry).active).user_data() }
}

/// Returns true if the origin coroutine is executing. A thread that was never converted only has
/// its origin, so it's true there too.
pub fn is_in_origin_coroutine() -> bool {
    let registry = Registry::current();
    registry.is_null() || unsafe { (*registry).is_origin_active() }
}

/// Gives the physical memory backing `handle`'s stack back to the OS, except for the `keep_size`
/// bytes closest to the stack's bottom where its frames live. The contents of the released part
/// are lost.
///
/// Advisory: does nothing for invalid handles, origins, when `keep_size` covers the whole stack
/// and on Windows, where fibers don't support it.
///
/// # Safety
/// `handle` must be a live coroutine created on this thread, and its suspended frames must fit
/// into `keep_size`.
///
/// # Panics
/// If the thread wasn't converted or `handle` is the active coroutine.
pub unsafe fn partial_decommit_coroutine_stack(handle: CoroutineHandle, keep_size: usize) {
    let registry = Registry::current();
    assert!(
        !registry.is_null(),
        "partial_decommit_coroutine_stack called before convert_thread_to_coroutine"
    );

    let context = match handle.0 {
        Some(context) => context.as_ptr(),
        None => return,
    };
    assert_ne!(
        (*registry).active,
        context,
        "the stack of the active coroutine can't be decommitted"
    );

    trace!(?context, keep_size, "decommitting coroutine stack");
    if let Err(error) = (*context).decommit(keep_size) {
        warn!(%error, ?context, keep_size, "failed to decommit coroutine stack");
    }
}

/// Returns where `handle` is in its lifecycle, `None` for an invalid handle.
///
/// # Safety
/// `handle` must be invalid or a live coroutine.
pub unsafe fn coroutine_state(handle: CoroutineHandle) -> Option<ContextState> {
    handle.0.map(|context| context.as_ref().state())
}

/// Returns the stack dimensions of a created coroutine, `None` for origins and invalid handles.
///
/// # Safety
/// `handle` must be invalid or a live coroutine.
pub unsafe fn coroutine_stack_size(handle: CoroutineHandle) -> Option<StackSize> {
    handle.0.and_then(|context| context.as_ref().stack_size())
}
