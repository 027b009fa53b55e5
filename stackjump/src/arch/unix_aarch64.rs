use std::arch::asm;
use std::mem::size_of;

use super::push;

/// Bytes written by [`init`] below the bottom of a fresh stack.
pub const INITIAL_FRAME_SIZE: usize = 4 * size_of::<usize>();

/// Returns the current value of `sp`.
#[inline(never)]
pub fn stack_pointer() -> *mut u8 {
    let sp: *mut u8;
    unsafe {
        asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    sp
}

/// Writes the initial frame to the stack ending at `bottom` and returns the stack pointer that
/// `swap` needs to enter `f`. `bottom` must be 16 byte aligned.
pub unsafe fn init(bottom: *mut usize, f: unsafe extern "C" fn(usize) -> !) -> *mut usize {
    let mut sp = bottom;
    // Padding, `sp` must stay 16 byte aligned at all times.
    sp = push(sp, 0);
    sp = push(sp, f as usize);
    // x29
    sp = push(sp, 0);
    // x19
    sp = push(sp, 0);
    sp
}

/// Swap to the stack at `new_sp`, storing the current one into `save_sp`. Returns once some other
/// context swaps back to the stored pointer.
#[inline(always)]
pub unsafe fn swap(arg: usize, save_sp: *mut *mut usize, new_sp: *mut usize) {
    asm!(
        "adr x10, 1337f",
        // x19 and x29 can't be marked as output registers.
        "sub sp, sp, #32",
        "stp x19, x29, [sp]",
        "str x10, [sp, #16]",
        "mov x10, sp",
        "str x10, [x1]",
        "mov sp, x2",
        "ldp x19, x29, [sp]",
        "ldr x10, [sp, #16]",
        "add sp, sp, #32",
        "br x10",
        "1337:",
        in("x0") arg, // 1st argument to a freshly entered function
        in("x1") save_sp,
        in("x2") new_sp,
        // Callee saved registers not covered by the C abi clobbers.
        out("x20") _, out("x21") _, out("x22") _, out("x23") _,
        out("x24") _, out("x25") _, out("x26") _, out("x27") _,
        out("x28") _,
        clobber_abi("C"),
    );
}
