use std::arch::asm;
use std::mem::size_of;

use super::push;

/// Bytes written by [`init`] below the bottom of a fresh stack.
pub const INITIAL_FRAME_SIZE: usize = 4 * size_of::<usize>();

/// Returns the current value of `rsp`.
#[inline(never)]
pub fn stack_pointer() -> *mut u8 {
    let sp: *mut u8;
    unsafe {
        asm!("mov {}, rsp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    sp
}

/// Writes the initial frame to the stack ending at `bottom` and returns the stack pointer that
/// `swap` needs to enter `f`. `bottom` must be 16 byte aligned.
pub unsafe fn init(bottom: *mut usize, f: unsafe extern "C" fn(usize) -> !) -> *mut usize {
    let mut sp = bottom;
    // Fake return address. "The value (%rsp + 8) is always a multiple of 16 when control is
    // transferred to the function entry point", after the three pops `rsp` points here.
    sp = push(sp, 0);
    sp = push(sp, f as usize);
    // rbp
    sp = push(sp, 0);
    // rbx
    sp = push(sp, 0);
    sp
}

/// Swap to the stack at `new_sp`, storing the current one into `save_sp`. Returns once some other
/// context swaps back to the stored pointer.
#[inline(always)]
pub unsafe fn swap(arg: usize, save_sp: *mut *mut usize, new_sp: *mut usize) {
    asm!(
        // Save the continuation spot after we jump back here to be after this asm block.
        "lea rax, [rip + 1337f]",
        "push rax",
        // rbp and rbx can't be marked as output registers.
        "push rbp",
        "push rbx",
        // Hand the suspended stack over to the outgoing context.
        "mov [rsi], rsp",
        // Change the stack pointer to the passed value.
        "mov rsp, rdx",
        "pop rbx",
        "pop rbp",
        // Get the next instruction to jump to.
        "pop rax",
        // Doing a pop & jmp instad of a ret helps us here with brench prediction.
        "jmp rax",
        "1337:",
        in("rdi") arg, // 1st argument to a freshly entered function
        in("rsi") save_sp,
        in("rdx") new_sp,
        // Callee saved registers not covered by the C abi clobbers.
        out("r12") _, out("r13") _, out("r14") _, out("r15") _,
        clobber_abi("C"),
    );
}
