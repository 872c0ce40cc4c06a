//! Register context: the fixed-layout snapshot shared by capture and resume.
//!
//! This module provides the core building blocks for fiber switching:
//! - `RegisterContext`: callee-saved registers, link address and stack pointer
//! - `capture`: snapshot the caller into a context (returns 0, later 1)
//! - `resume`: load a context and jump to it (never returns)
//! - `switch`: capture one context and resume another in a single call
//!
//! # Layout
//!
//! The layout is a private ABI shared with the assembly routines and must
//! stay bit-exact:
//!
//! | Offset      | Slot        | aarch64  | x86_64                                 |
//! |-------------|-------------|----------|----------------------------------------|
//! | 0x00..0x40  | `fp[0..8]`  | d8..d15  | `fp[0]`: MXCSR, x87 CW; rest unused    |
//! | 0x40..0x90  | `gp[0..10]` | x19..x28 | rbx, r12, r13, r14, r15, rbp; rest unused |
//! | 0x90        | `lr`        | x30      | return address of the `capture` call   |
//! | 0x98        | `sp`        | sp       | rsp after `capture` returns            |

use std::mem::{offset_of, size_of};

pub use crate::arch::{bootstrap_trampoline, capture, resume, switch};

/// Number of floating-point callee-saved slots.
pub const FP_SLOTS: usize = 8;
/// Number of general-purpose callee-saved slots.
pub const GP_SLOTS: usize = 10;

/// Byte offset of `fp[0]`.
pub const FP_OFFSET: usize = 0x00;
/// Byte offset of `gp[0]`.
pub const GP_OFFSET: usize = 0x40;
/// Byte offset of the link slot.
pub const LR_OFFSET: usize = 0x90;
/// Byte offset of the stack-pointer slot.
pub const SP_OFFSET: usize = 0x98;
/// Size of a `RegisterContext` in bytes (20 slots).
pub const CONTEXT_SIZE: usize = 0xa0;

/// Required alignment of the stack pointer at every resume.
pub const STACK_ALIGN: usize = 16;

/// `gp` slot holding the argument passed by [`bootstrap_trampoline`].
pub const ARG_SLOT: usize = 0;
/// `gp` slot holding the entry routine called by [`bootstrap_trampoline`].
pub const ENTRY_SLOT: usize = 1;

/// Entry routine of a bootstrapped context. It runs on the fresh stack and
/// must leave through [`resume`].
pub type BootstrapEntry = extern "C" fn(usize) -> !;

/// Saved register state of one suspended execution.
#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterContext {
    /// Floating-point callee-saved (lower 64 bits)
    fp: [u64; FP_SLOTS],
    /// General purpose callee-saved
    gp: [u64; GP_SLOTS],
    /// Link register (resumption address)
    lr: u64,
    /// Stack pointer
    sp: u64,
}

const _: () = {
    assert!(offset_of!(RegisterContext, fp) == FP_OFFSET);
    assert!(offset_of!(RegisterContext, gp) == GP_OFFSET);
    assert!(offset_of!(RegisterContext, lr) == LR_OFFSET);
    assert!(offset_of!(RegisterContext, sp) == SP_OFFSET);
    assert!(size_of::<RegisterContext>() == CONTEXT_SIZE);
};

impl RegisterContext {
    /// An all-zero context. Valid as a `capture` target only.
    pub const fn zeroed() -> Self {
        RegisterContext {
            fp: [0; FP_SLOTS],
            gp: [0; GP_SLOTS],
            lr: 0,
            sp: 0,
        }
    }

    /// Create a context for a brand-new fiber.
    ///
    /// - `stack_top`: highest address of the fiber stack, 16-byte aligned
    /// - `entry`: routine the trampoline calls on the fresh stack
    /// - `arg`: value handed to `entry`
    ///
    /// Resuming the result starts [`bootstrap_trampoline`] with
    /// `sp = stack_top`.
    pub fn bootstrap(stack_top: usize, entry: BootstrapEntry, arg: usize) -> Self {
        debug_assert_eq!(stack_top % STACK_ALIGN, 0, "misaligned stack top");

        let mut gp = [0; GP_SLOTS];
        gp[ARG_SLOT] = arg as u64;
        gp[ENTRY_SLOT] = entry as usize as u64;

        RegisterContext {
            fp: crate::arch::INITIAL_FP,
            gp,
            lr: bootstrap_trampoline as usize as u64,
            sp: stack_top as u64,
        }
    }

    pub fn stack_pointer(&self) -> usize {
        self.sp as usize
    }

    pub fn set_stack_pointer(&mut self, sp: usize) {
        self.sp = sp as u64;
    }

    /// Address control transfers to on resume.
    pub fn link(&self) -> usize {
        self.lr as usize
    }

    pub fn set_link(&mut self, lr: usize) {
        self.lr = lr as u64;
    }

    pub fn fp_slots(&self) -> &[u64; FP_SLOTS] {
        &self.fp
    }

    pub fn gp_slots(&self) -> &[u64; GP_SLOTS] {
        &self.gp
    }

    /// # Panics
    /// If `index >= FP_SLOTS`.
    pub fn set_fp(&mut self, index: usize, value: u64) {
        self.fp[index] = value;
    }

    /// # Panics
    /// If `index >= GP_SLOTS`.
    pub fn set_gp(&mut self, index: usize, value: u64) {
        self.gp[index] = value;
    }

    /// View the context as its raw 20 slots, in layout order.
    pub fn as_slots(&self) -> &[u64; CONTEXT_SIZE / 8] {
        // SAFETY: repr(C), 20 contiguous u64 fields with no padding (checked above)
        unsafe { &*(self as *const Self as *const [u64; CONTEXT_SIZE / 8]) }
    }
}
