//! Register-context capture and resume for stackful fibers.
//!
//! The core is two routines over a fixed-layout [`RegisterContext`]:
//! - [`capture`] records the caller's callee-saved registers, stack pointer
//!   and return address, and returns 0
//! - [`resume`] loads a context and jumps to it; the matching `capture`
//!   call then returns a second time with 1
//!
//! [`FiberStack`] and [`Fiber`] are a thin, safe layer on top: stack mapping
//! with a guard page, bootstrap through a trampoline, and suspend/resume.
//!
//! # Example
//!
//! ```no_run
//! use fiberctx::{RegisterContext, capture, resume};
//!
//! /// Captures `home`, then resumes it straight away.
//! #[inline(never)]
//! unsafe fn bounce(home: *mut RegisterContext) -> u64 {
//!     let ret = unsafe { capture(home) };
//!     if ret == 0 {
//!         // first return: jump back to the capture site
//!         unsafe { resume(home) }
//!     }
//!     // second return, capture yielded 1
//!     ret
//! }
//!
//! let mut ctx = RegisterContext::zeroed();
//! assert_eq!(unsafe { bounce(&mut ctx) }, 1);
//! ```

mod arch;
pub mod context;
pub mod fiber;
pub mod stack;

pub use context::{BootstrapEntry, RegisterContext, capture, resume, switch};
pub use fiber::{Fiber, FiberConfig, FiberState, Suspender};
pub use stack::FiberStack;
