//! x86_64 implementation of capture and resume
//!
//! Development-host backend. The System V callee-saved set is mapped onto
//! the same slot layout as aarch64:
//! - `gp[0..6]`: rbx, r12, r13, r14, r15, rbp (`gp[6..10]` unused)
//! - `fp[0]`: MXCSR in bits 0..32, x87 control word in bits 32..48
//!   (`fp[1..8]` unused)
//! - `lr`: return address of the `capture` call, `sp`: rsp after it returns

use crate::context::RegisterContext;
use std::arch::naked_asm;

/// Floating-point slot values for a freshly bootstrapped context.
///
/// Power-on defaults: MXCSR 0x1f80 (all exceptions masked), x87 CW 0x037f.
pub const INITIAL_FP: [u64; 8] = [0x0000_037f_0000_1f80, 0, 0, 0, 0, 0, 0, 0];

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
    // rdi = ctx
    naked_asm!(
        "stmxcsr dword ptr [rdi + 0x00]",
        "fnstcw word ptr [rdi + 0x04]",
        "mov [rdi + 0x40], rbx",
        "mov [rdi + 0x48], r12",
        "mov [rdi + 0x50], r13",
        "mov [rdi + 0x58], r14",
        "mov [rdi + 0x60], r15",
        "mov [rdi + 0x68], rbp",
        "mov rax, [rsp]",
        "mov [rdi + 0x90], rax", // lr
        "lea rax, [rsp + 8]",
        "mov [rdi + 0x98], rax", // sp
        "xor eax, eax",
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
    // rdi = ctx
    naked_asm!(
        "ldmxcsr dword ptr [rdi + 0x00]",
        "fldcw word ptr [rdi + 0x04]",
        "mov rbx, [rdi + 0x40]",
        "mov r12, [rdi + 0x48]",
        "mov r13, [rdi + 0x50]",
        "mov r14, [rdi + 0x58]",
        "mov r15, [rdi + 0x60]",
        "mov rbp, [rdi + 0x68]",
        "mov rsp, [rdi + 0x98]",
        "mov eax, 1",
        "jmp qword ptr [rdi + 0x90]",
    );
}

/// Capture into `from`, then resume `to`.
///
/// Returns once something resumes `from`.
///
/// # Safety
/// Same contract as [`capture`] for `from` and [`resume`] for `to`.
#[unsafe(naked)]
pub unsafe extern "C" fn switch(_from: *mut RegisterContext, _to: *const RegisterContext) {
    // rdi = from, rsi = to
    naked_asm!(
        // keeps rsp 16-byte aligned at the call
        "push rsi",
        "call {capture}",
        "test rax, rax",
        "jnz 2f",
        "mov rdi, [rsp]",
        "jmp {resume}",
        "2:",
        "add rsp, 8",
        "ret",
        capture = sym capture,
        resume = sym resume,
    );
}

/// Entry stub for bootstrap contexts.
///
/// Calls the entry routine held in `gp[1]` (r12) with the argument in
/// `gp[0]` (rbx), starting a fresh frame-pointer chain. The stack pointer
/// slot must be 16-byte aligned so the call leaves the ABI-required layout.
///
/// # Safety
/// Only reachable through [`resume`] of a bootstrap context.
#[unsafe(naked)]
pub unsafe extern "C" fn bootstrap_trampoline() -> ! {
    naked_asm!(
        "mov rdi, rbx",
        "xor ebp, ebp",
        "call r12",
        // entry routines never return
        "ud2",
    );
}
