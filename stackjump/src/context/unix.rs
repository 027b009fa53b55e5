use std::ffi::c_void;
use std::mem::size_of;
use std::process;
use std::ptr;

use super::{run_entry, ContextState, EntryPoint, StackSize, MAX_INITIAL_FRAME};
use crate::stack::GuardedStack;
use crate::{arch, sanitizer, Error};

enum Kind {
    // The thread's native stack.
    Origin,
    Created {
        entry: EntryPoint,
        stack: GuardedStack,
    },
}

/// One execution context: either the native stack of a thread or an entry point running on its
/// own guarded stack.
///
/// While a context is not [`Active`](ContextState::Active), `sp` points at the frame that
/// `arch::swap` (or `arch::init`) left on its stack.
pub struct Context {
    sp: *mut usize,
    state: ContextState,
    user_data: *mut c_void,
    // Stack announced to the sanitizer when switching to this context.
    bounds: (*const u8, usize),
    kind: Kind,
}

impl Context {
    /// Creates the context of the calling thread's native stack. It starts out active.
    pub fn origin(user_data: *mut c_void) -> Result<Box<Context>, Error> {
        Ok(Box::new(Context {
            sp: ptr::null_mut(),
            state: ContextState::Active,
            user_data,
            bounds: sanitizer::thread_stack(),
            kind: Kind::Origin,
        }))
    }

    /// Allocates a stack and captures a context that calls `entry(user_data)` once it's switched
    /// to for the first time.
    pub fn new(
        commit_size: usize,
        reserve_size: usize,
        entry: EntryPoint,
        user_data: *mut c_void,
    ) -> Result<Box<Context>, Error> {
        let stack = GuardedStack::new(commit_size, reserve_size)?;
        let sp = capture(&stack);
        Ok(Box::new(Context {
            sp,
            state: ContextState::Captured,
            user_data,
            bounds: (stack.top() as *const u8, stack.size()),
            kind: Kind::Created { entry, stack },
        }))
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

    /// Returns `None` for an origin context.
    pub fn stack_size(&self) -> Option<StackSize> {
        match &self.kind {
            Kind::Origin => None,
            Kind::Created { stack, .. } => Some(StackSize {
                reserved: stack.size(),
                committed: stack.committed(),
            }),
        }
    }

    /// Returns true if `ptr` points into the stack owned by this context.
    pub fn stack_contains(&self, ptr: *const u8) -> bool {
        match &self.kind {
            Kind::Origin => false,
            Kind::Created { stack, .. } => stack.contains(ptr),
        }
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

        sanitizer::start_switch((*to).bounds);
        arch::swap(to as usize, ptr::addr_of_mut!((*from).sp), (*to).sp);
        sanitizer::finish_switch();
    }

    /// Drops the physical memory of the stack except for the `keep_size` bytes closest to its
    /// bottom. Does nothing for an origin context.
    ///
    /// # Safety
    /// The context must not be running, and its suspended frames must fit into `keep_size`.
    pub unsafe fn decommit(&mut self, keep_size: usize) -> Result<(), Error> {
        debug_assert_ne!(self.state, ContextState::Active);
        match &mut self.kind {
            Kind::Origin => Ok(()),
            Kind::Created { stack, .. } => stack.decommit(keep_size),
        }
    }
}

// Validates the initial frame against the stack and writes it.
fn capture(stack: &GuardedStack) -> *mut usize {
    let frame_size = arch::INITIAL_FRAME_SIZE;
    assert!(frame_size >= size_of::<usize>(), "empty initial frame");
    assert_eq!(frame_size % size_of::<usize>(), 0, "misaligned initial frame");
    assert!(
        frame_size <= MAX_INITIAL_FRAME,
        "initial frame of {} bytes exceeds {}",
        frame_size,
        MAX_INITIAL_FRAME
    );
    assert!(
        frame_size <= stack.size(),
        "initial frame of {} bytes doesn't fit a {} byte stack",
        frame_size,
        stack.size()
    );

    let bottom = stack.bottom() as *mut usize;
    let sp = unsafe { arch::init(bottom, trampoline) };
    debug_assert_eq!(bottom as usize - sp as usize, frame_size);
    sp
}

// First code running on a new stack, `arch::swap` jumps here with the context as argument.
unsafe extern "C" fn trampoline(context: usize) -> ! {
    sanitizer::finish_switch();

    let context = context as *const Context;
    match &(*context).kind {
        Kind::Created { entry, .. } => run_entry(*entry, (*context).user_data),
        // Origins are never captured, their stack pointer only ever comes from `swap`.
        Kind::Origin => process::abort(),
    }
}
