//! AddressSanitizer fiber hints.
//!
//! ASan keeps shadow state for the stack it believes is running. Every swap must be announced
//! with the bounds of the destination stack right before the stack pointer changes, and confirmed
//! right after arriving on the new stack. Without the `sanitizer-hints` feature all of this
//! compiles to nothing.

#[cfg(all(feature = "sanitizer-hints", target_os = "linux"))]
mod imp {
    use std::ffi::c_void;
    use std::{mem, ptr};

    extern "C" {
        fn __sanitizer_start_switch_fiber(
            fake_stack_save: *mut *mut c_void,
            bottom: *const c_void,
            size: usize,
        );
        fn __sanitizer_finish_switch_fiber(
            fake_stack_save: *mut c_void,
            bottom_old: *mut *const c_void,
            size_old: *mut usize,
        );
    }

    #[inline(never)]
    pub fn start_switch(bounds: (*const u8, usize)) {
        unsafe { __sanitizer_start_switch_fiber(ptr::null_mut(), bounds.0 as *const c_void, bounds.1) }
    }

    #[inline(never)]
    pub fn finish_switch() {
        unsafe { __sanitizer_finish_switch_fiber(ptr::null_mut(), ptr::null_mut(), ptr::null_mut()) }
    }

    /// Lowest address and size of the calling thread's native stack.
    pub fn thread_stack() -> (*const u8, usize) {
        unsafe {
            let mut attributes: libc::pthread_attr_t = mem::zeroed();
            let mut stack: *mut c_void = ptr::null_mut();
            let mut size = 0usize;
            if libc::pthread_getattr_np(libc::pthread_self(), &mut attributes) != 0 {
                return (ptr::null(), 0);
            }
            let result = libc::pthread_attr_getstack(&attributes, &mut stack, &mut size);
            libc::pthread_attr_destroy(&mut attributes);
            if result != 0 {
                return (ptr::null(), 0);
            }
            (stack as *const u8, size)
        }
    }
}

#[cfg(not(all(feature = "sanitizer-hints", target_os = "linux")))]
mod imp {
    use std::ptr;

    #[inline(always)]
    pub fn start_switch(_bounds: (*const u8, usize)) {}

    #[inline(always)]
    pub fn finish_switch() {}

    pub fn thread_stack() -> (*const u8, usize) {
        (ptr::null(), 0)
    }
}

pub(crate) use imp::*;
