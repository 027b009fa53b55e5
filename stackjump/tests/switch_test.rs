use std::ffi::c_void;
use std::ptr;

use stackjump::{Context, ContextState};

struct PingPong {
    origin: *mut Context,
    coroutine: *mut Context,
    input: u64,
    output: u64,
    inside_own_stack: bool,
}

fn add_one(data: *mut c_void) -> ! {
    let ping = data as *mut PingPong;
    loop {
        unsafe {
            (*ping).output = (*ping).input + 1;
            #[cfg(target_family = "unix")]
            {
                (*ping).inside_own_stack =
                    (*(*ping).coroutine).stack_contains(stackjump::stack_pointer());
            }
            Context::switch((*ping).coroutine, (*ping).origin);
        }
    }
}

fn ping_pong() -> *mut PingPong {
    Box::into_raw(Box::new(PingPong {
        origin: ptr::null_mut(),
        coroutine: ptr::null_mut(),
        input: 0,
        output: 0,
        inside_own_stack: false,
    }))
}

#[test]
fn switch_stack() {
    let ping = ping_pong();
    unsafe {
        (*ping).origin = Box::into_raw(Context::origin(ptr::null_mut()).unwrap());
        (*ping).coroutine = Box::into_raw(
            Context::new(16 * 1024, 256 * 1024, add_one, ping as *mut c_void).unwrap(),
        );
        assert_eq!((*(*ping).origin).state(), ContextState::Active);
        assert_eq!((*(*ping).coroutine).state(), ContextState::Captured);

        for input in &[2, 127, u64::MAX - 1] {
            (*ping).input = *input;
            Context::switch((*ping).origin, (*ping).coroutine);
            assert_eq!((*ping).output, input + 1);
            assert_eq!((*(*ping).origin).state(), ContextState::Active);
            assert_eq!((*(*ping).coroutine).state(), ContextState::Suspended);
        }

        #[cfg(target_family = "unix")]
        assert!((*ping).inside_own_stack);

        drop(Box::from_raw((*ping).coroutine));
        drop(Box::from_raw((*ping).origin));
        drop(Box::from_raw(ping));
    }
}

#[test]
fn origin_has_no_stack() {
    let origin = Context::origin(0xC0FFEE as *mut c_void).unwrap();
    assert!(origin.is_origin());
    assert_eq!(origin.user_data(), 0xC0FFEE as *mut c_void);
    assert_eq!(origin.stack_size(), None);
}

#[test]
fn created_context_reports_stack_size() {
    let context = Context::new(4096, 64 * 1024, add_one, ptr::null_mut()).unwrap();
    assert!(!context.is_origin());
    let size = context.stack_size().unwrap();
    assert_eq!(size.reserved, 64 * 1024);
    assert!(size.committed >= 4096);
}

#[test]
#[cfg(target_family = "unix")]
fn initial_frame_is_within_bounds() {
    assert!(stackjump::INITIAL_FRAME_SIZE <= stackjump::MAX_INITIAL_FRAME);
    assert_eq!(stackjump::INITIAL_FRAME_SIZE % 16, 0);
}

#[test]
#[cfg(target_family = "unix")]
fn stack_pointer_is_on_thread_stack() {
    let local = 0u8;
    let sp = stackjump::stack_pointer() as usize;
    let local = &local as *const u8 as usize;
    // Same stack, within a few pages of each other.
    assert!(sp.max(local) - sp.min(local) < 64 * 1024);
}

#[test]
fn deep_recursion_on_small_stack() {
    struct Deep {
        origin: *mut Context,
        coroutine: *mut Context,
        result: u8,
    }

    // Uses 1 Kb per iteration
    fn rec(n: u64) -> u8 {
        let x: [u8; 1024] = [1; 1024];
        if n < 1 {
            std::hint::black_box(x)[0]
        } else {
            std::hint::black_box(rec(n - 1))
        }
    }

    fn recurse(data: *mut c_void) -> ! {
        let deep = data as *mut Deep;
        unsafe {
            (*deep).result = rec(200);
            loop {
                Context::switch((*deep).coroutine, (*deep).origin);
            }
        }
    }

    let deep = Box::into_raw(Box::new(Deep {
        origin: ptr::null_mut(),
        coroutine: ptr::null_mut(),
        result: 0,
    }));
    unsafe {
        (*deep).origin = Box::into_raw(Context::origin(ptr::null_mut()).unwrap());
        // 200 Kb of frames, more than the 4 Kb initially committed.
        (*deep).coroutine = Box::into_raw(
            Context::new(4096, 1024 * 1024, recurse, deep as *mut c_void).unwrap(),
        );
        Context::switch((*deep).origin, (*deep).coroutine);
        assert_eq!((*deep).result, 1);

        drop(Box::from_raw((*deep).coroutine));
        drop(Box::from_raw((*deep).origin));
        drop(Box::from_raw(deep));
    }
}

#[test]
#[should_panic]
#[cfg(target_family = "unix")]
fn reject_stack_smaller_than_initial_frame() {
    let _ = Context::new(0, 0, add_one, ptr::null_mut());
}
