//! aarch64 implementation of capture and resume
//!
//! On aarch64 (AAPCS64) the callee-saved set is:
//! - d8-d15: lower 64 bits of v8-v15 -> `fp[0..8]`
//! - x19-x28: general purpose -> `gp[0..10]`
//! - x30 (lr) and sp -> `lr`, `sp`
//!
//! x29 is not part of the context. `switch` keeps it on the suspending
//! stack instead, so frame-pointer chains survive a fiber switch.

use crate::context::RegisterContext;
use std::arch::naked_asm;

/// Floating-point slot values for a freshly bootstrapped context.
pub const INITIAL_FP: [u64; 8] = [0; 8];

/// Record the caller's callee-saved registers, stack pointer and return
/// address into `ctx`, then return 0.
///
/// When `ctx` is later passed to [`resume`], this call returns a second time,
/// yielding 1.
///
/// # Safety
/// `ctx` must be valid for writes of a whole `RegisterContext`. The calling
/// frame must stay live for as long as `ctx` may be resumed.
///
/// This call returns twice, and the second return only restores what the
/// context holds. Caller-saved registers and the frame pointer are not
/// restored, and the compiler does not know about the second return. Call
/// `capture` from a small `#[inline(never)]` function that only branches on
/// the result, and keep anything needed after the second return in memory
/// outside that frame.
#[unsafe(naked)]
pub unsafe extern "C" fn capture(_ctx: *mut RegisterContext) -> u64 {
    // x0 = ctx
    naked_asm!(
        "stp d8,  d9,  [x0, #0x00]",
        "stp d10, d11, [x0, #0x10]",
        "stp d12, d13, [x0, #0x20]",
        "stp d14, d15, [x0, #0x30]",
        "stp x19, x20, [x0, #0x40]",
        "stp x21, x22, [x0, #0x50]",
        "stp x23, x24, [x0, #0x60]",
        "stp x25, x26, [x0, #0x70]",
        "stp x27, x28, [x0, #0x80]",
        "mov x9, sp",
        "stp x30, x9,  [x0, #0x90]", // lr, sp
        "mov x0, #0",
        "ret",
    );
}

/// Load `ctx` into the live register file and jump to its link address.
///
/// Never returns. For a captured context the matching [`capture`] call
/// returns 1; for a bootstrap context execution starts at the trampoline.
///
/// # Safety
/// `ctx` must be captured or bootstrapped, and its stack must still be live.
#[unsafe(naked)]
pub unsafe extern "C" fn resume(_ctx: *const RegisterContext) -> ! {
    // x0 = ctx
    naked_asm!(
        "ldp d8,  d9,  [x0, #0x00]",
        "ldp d10, d11, [x0, #0x10]",
        "ldp d12, d13, [x0, #0x20]",
        "ldp d14, d15, [x0, #0x30]",
        "ldp x19, x20, [x0, #0x40]",
        "ldp x21, x22, [x0, #0x50]",
        "ldp x23, x24, [x0, #0x60]",
        "ldp x25, x26, [x0, #0x70]",
        "ldp x27, x28, [x0, #0x80]",
        "ldp x30, x9,  [x0, #0x90]", // lr, sp
        "mov sp, x9",
        "mov x0, #1",
        "ret",
    );
}

/// Capture into `from`, then resume `to`.
///
/// Returns once something resumes `from`. The frame pointer and the real
/// return address are spilled onto the current stack around the capture.
///
/// # Safety
/// Same contract as [`capture`] for `from` and [`resume`] for `to`.
#[unsafe(naked)]
pub unsafe extern "C" fn switch(_from: *mut RegisterContext, _to: *const RegisterContext) {
    // x0 = from, x1 = to
    naked_asm!(
        "stp x29, x30, [sp, #-32]!",
        "str x1, [sp, #16]",
        "bl {capture}",
        "cbnz x0, 2f",
        "ldr x0, [sp, #16]",
        "b {resume}",
        "2:",
        "ldp x29, x30, [sp], #32",
        "ret",
        capture = sym capture,
        resume = sym resume,
    );
}

/// Entry stub for bootstrap contexts.
///
/// Calls the entry routine held in `gp[1]` (x20) with the argument in
/// `gp[0]` (x19), starting a fresh frame-pointer chain.
///
/// # Safety
/// Only reachable through [`resume`] of a bootstrap context.
#[unsafe(naked)]
pub unsafe extern "C" fn bootstrap_trampoline() -> ! {
    naked_asm!(
        "mov x0, x19",
        "mov x29, xzr",
        "blr x20",
        // entry routines never return
        "brk #0x1",
    );
}
