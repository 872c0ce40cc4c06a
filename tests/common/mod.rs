#![allow(dead_code)]

use fiberctx::{RegisterContext, capture, resume};
use std::arch::asm;

/// Captures `home`, jumps to `target`, and returns once `home` is resumed.
///
/// Always returns the second result of the capture, i.e. 1.
///
/// # Safety
/// `target` must be a resumable context that eventually resumes `home`.
#[inline(never)]
pub unsafe fn run_until_resumed(home: *mut RegisterContext, target: *const RegisterContext) -> u64 {
    let ret = unsafe { capture(home) };
    if ret == 0 {
        unsafe { resume(target) }
    }
    ret
}

/// Current stack pointer.
#[inline(always)]
pub fn stack_pointer() -> usize {
    let sp: usize;
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    #[cfg(target_arch = "x86_64")]
    unsafe {
        asm!("mov {}, rsp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    sp
}

/// Current frame-pointer register (x29 / rbp).
#[inline(always)]
pub fn frame_pointer() -> usize {
    let fp: usize;
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("mov {}, x29", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    #[cfg(target_arch = "x86_64")]
    unsafe {
        asm!("mov {}, rbp", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    fp
}

pub extern "C" fn unreachable_entry(_arg: usize) -> ! {
    unreachable!("bootstrap entry replaced by the test")
}
