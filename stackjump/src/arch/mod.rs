// All architectures expose the same api. Here I just want to take some time explaining the general
// idea behind all of them.
//
// At the core of the implementation there are 3 functions:
// * `stack_pointer() -> *mut u8`
// * `init(bottom: *mut usize, f: unsafe extern "C" fn(usize) -> !) -> *mut usize`
// * `swap(arg: usize, save_sp: *mut *mut usize, new_sp: *mut usize)`
//
// ### init
// `init` takes the **bottom** (highest address) of a freshly allocated stack and a **pointer to a
// function**. It writes a small frame that looks exactly like the frame `swap` leaves behind when
// it suspends a context, so the first switch to the new stack is no different from any other one.
// ```
//      +------------------+  <- bottom (16 byte aligned)
//      |Fake return (0)   |
//      +------------------+
//      |Function ptr      |  <- "resume address" popped by swap
//      +------------------+
//      |Frame pointer (0) |
//      +------------------+
//      |Reserved reg (0)  |  <- returned stack pointer
//      +------------------+
// ```
// The frame pointer and the reserved register (`rbx` on x86_64, `x19` on AArch64) are saved by
// hand because LLVM doesn't allow them as inline assembly operands. The fake return address keeps
// the stack aligned as the ABI expects it at a function entry and terminates backtraces.
//
// ### swap
// The swap function will:
// 1. Push the continuation address, the frame pointer and the reserved register to the current
//    stack.
// 2. Store the current stack pointer to `save_sp` (the outgoing context).
// 3. Change the stack pointer to `new_sp`.
// 4. Pop the reserved register, the frame pointer and the continuation address from the new stack.
// 5. Jump to the continuation, with `arg` in the first argument register.
//
// When the continuation belongs to a suspended context we land right after its own `swap` and
// `arg` is ignored. When it belongs to a captured context we land at the start of the function
// passed to `init`, which receives `arg` as its first argument. Every other register is marked as
// clobbered so the compiler only spills what is actually live across the switch.

#[cfg(target_arch = "x86_64")]
mod unix_x64;
#[cfg(target_arch = "x86_64")]
pub use self::unix_x64::*;

#[cfg(target_arch = "aarch64")]
mod unix_aarch64;
#[cfg(target_arch = "aarch64")]
pub use self::unix_aarch64::*;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("stackjump only supports x86_64 and aarch64 on unix");

/// Pushes `val` onto a downward growing stack.
#[inline(always)]
unsafe fn push(mut sp: *mut usize, val: usize) -> *mut usize {
    sp = sp.offset(-1);
    *sp = val;
    sp
}
