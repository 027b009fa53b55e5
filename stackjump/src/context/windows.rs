use std::ffi::c_void;
use std::io;
use std::process;
use std::ptr;

use winapi::ctypes::c_void as win_void;
use winapi::um::winbase::{
    ConvertFiberToThread, ConvertThreadToFiber, CreateFiberEx, DeleteFiber, SwitchToFiber,
};

use super::{run_entry, ContextState, EntryPoint, StackSize};
use crate::Error;

enum Kind {
    // The thread itself, converted to a fiber.
    Origin,
    Created { entry: EntryPoint, size: StackSize },
}

/// One execution context backed by a native fiber. The OS owns the stack and the register state,
/// this only keeps what the fiber API doesn't track for us.
pub struct Context {
    fiber: *mut win_void,
    state: ContextState,
    user_data: *mut c_void,
    kind: Kind,
}

impl Context {
    /// Converts the calling thread to a fiber. The returned context starts out active and converts
    /// the thread back when dropped.
    pub fn origin(user_data: *mut c_void) -> Result<Box<Context>, Error> {
        let fiber = unsafe { ConvertThreadToFiber(ptr::null_mut()) };
        if fiber.is_null() {
            return Err(Error::ConvertThread(io::Error::last_os_error()));
        }
        Ok(Box::new(Context {
            fiber,
            state: ContextState::Active,
            user_data,
            kind: Kind::Origin,
        }))
    }

    /// Creates a fiber that calls `entry(user_data)` once it's switched to for the first time.
    pub fn new(
        commit_size: usize,
        reserve_size: usize,
        entry: EntryPoint,
        user_data: *mut c_void,
    ) -> Result<Box<Context>, Error> {
        let mut context = Box::new(Context {
            fiber: ptr::null_mut(),
            state: ContextState::Captured,
            user_data,
            kind: Kind::Created {
                entry,
                size: StackSize {
                    reserved: reserve_size,
                    committed: commit_size,
                },
            },
        });
        // The box keeps the context at a stable address for the fiber's start routine.
        let parameter = &mut *context as *mut Context as *mut win_void;
        let fiber = unsafe {
            CreateFiberEx(commit_size, reserve_size, 0, Some(fiber_main), parameter)
        };
        if fiber.is_null() {
            return Err(Error::Fiber(io::Error::last_os_error()));
        }
        context.fiber = fiber;
        Ok(context)
    }

    pub fn is_origin(&self) -> bool {
        matches!(self.kind, Kind::Origin)
    }

    pub fn user_data(&self) -> *mut c_void {
        self.user_data
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Returns `None` for an origin context. Sizes are reported as requested without page rounding,
    /// the OS rounds them internally and doesn't report the result.
    pub fn stack_size(&self) -> Option<StackSize> {
        match &self.kind {
            Kind::Origin => None,
            Kind::Created { size, .. } => Some(*size),
        }
    }

    /// Fiber stacks are opaque, always false.
    pub fn stack_contains(&self, _ptr: *const u8) -> bool {
        false
    }

    /// Suspends `from` (the running context) and resumes `to`. Returns when some other context
    /// switches back to `from`.
    ///
    /// # Safety
    /// `from` must be the context currently running on this thread, `to` a different context of
    /// the same thread. Both must stay alive until `from` is resumed.
    pub unsafe fn switch(from: *mut Context, to: *mut Context) {
        debug_assert_ne!(from, to);
        debug_assert_eq!((*from).state, ContextState::Active);
        (*from).state = ContextState::Suspended;
        (*to).state = ContextState::Active;

        SwitchToFiber((*to).fiber);
    }

    /// The fiber API has no way to give back part of a fiber's stack. Does nothing.
    ///
    /// # Safety
    /// The context must not be running.
    pub unsafe fn decommit(&mut self, _keep_size: usize) -> Result<(), Error> {
        debug_assert_ne!(self.state, ContextState::Active);
        Ok(())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        match self.kind {
            Kind::Origin => {
                let result = unsafe { ConvertFiberToThread() };
                debug_assert_ne!(result, 0);
            }
            // Null if `CreateFiberEx` failed.
            Kind::Created { .. } if self.fiber.is_null() => {}
            Kind::Created { .. } => unsafe { DeleteFiber(self.fiber) },
        }
    }
}

unsafe extern "system" fn fiber_main(parameter: *mut win_void) {
    let context = parameter as *const Context;
    match &(*context).kind {
        Kind::Created { entry, .. } => run_entry(*entry, (*context).user_data),
        Kind::Origin => process::abort(),
    }
}
