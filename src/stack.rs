//! Fiber stack provisioning.
//!
//! Stacks are anonymous mappings. The lowest page is an optional guard page
//! (PROT_NONE), so running off the end of a fiber stack faults instead of
//! silently corrupting the neighbouring mapping.

use crate::context::STACK_ALIGN;
use log::debug;
use std::io;
use std::ops::Range;
use std::ptr;

/// Memory region a fiber runs on.
///
/// Lifecycle:
/// 1. `new(size)` maps `size` bytes (rounded up to whole pages) plus a guard page
/// 2. `top()` seeds the stack pointer of a bootstrap context
/// 3. the mapping is released on drop
///
/// The owner must not drop the stack while a context pointing into it may
/// still be resumed.
pub struct FiberStack {
    base: *mut u8,
    /// Total mapped size (usable + guard page).
    mapped: usize,
    /// Guard page size, 0 if disabled.
    guard: usize,
}

impl FiberStack {
    /// Map a stack with at least `size` usable bytes and a guard page.
    pub fn new(size: usize) -> Result<Self, anyhow::Error> {
        Self::with_guard(size, true)
    }

    /// Map a stack with at least `size` usable bytes, optionally guarded.
    pub fn with_guard(size: usize, guard: bool) -> Result<Self, anyhow::Error> {
        anyhow::ensure!(size > 0, "fiber stack size must be non-zero");

        let page_size = page_size();
        let usable = align_up(size, page_size)
            .ok_or_else(|| anyhow::anyhow!("fiber stack size {size} overflows"))?;
        let guard = if guard { page_size } else { 0 };
        let mapped = usable
            .checked_add(guard)
            .ok_or_else(|| anyhow::anyhow!("fiber stack size {size} overflows with guard"))?;

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapped,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        anyhow::ensure!(
            base != libc::MAP_FAILED,
            "fiber stack mmap of {mapped} bytes failed: {}",
            io::Error::last_os_error()
        );

        // Stacks grow downward, so the guard goes at the lowest address.
        if guard > 0 {
            let ret = unsafe { libc::mprotect(base, guard, libc::PROT_NONE) };
            if ret != 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::munmap(base, mapped) };
                anyhow::bail!("fiber stack guard mprotect failed: {err}");
            }
        }

        debug!(
            "mapped fiber stack at {:p} ({} usable bytes, guard {} bytes)",
            base, usable, guard
        );

        Ok(FiberStack {
            base: base as *mut u8,
            mapped,
            guard,
        })
    }

    /// Highest usable address, aligned for use as an initial stack pointer.
    pub fn top(&self) -> usize {
        (self.base as usize + self.mapped) & !(STACK_ALIGN - 1)
    }

    /// Lowest usable address (just above the guard page).
    pub fn bottom(&self) -> usize {
        self.base as usize + self.guard
    }

    /// Usable bytes between `bottom()` and `top()`.
    pub fn size(&self) -> usize {
        self.top() - self.bottom()
    }

    /// Whether `addr` lies within the usable region (inclusive of `top()`).
    pub fn contains(&self, addr: usize) -> bool {
        (self.bottom()..=self.top()).contains(&addr)
    }

    /// Address range of the guard page, if one was mapped.
    pub fn guard_page(&self) -> Option<Range<usize>> {
        (self.guard > 0).then(|| self.base as usize..self.bottom())
    }
}

impl Drop for FiberStack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.mapped);
        }
        debug!("unmapped fiber stack at {:p}", self.base);
    }
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

fn align_up(val: usize, align: usize) -> Option<usize> {
    Some(val.checked_add(align - 1)? & !(align - 1))
}
