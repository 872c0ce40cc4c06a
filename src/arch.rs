//! Architecture-specific capture/resume routines.
//!
//! aarch64 is the reference backend; x86_64 maps the System V callee-saved
//! set onto the same slot layout so fibers also run on x86_64 hosts.

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use aarch64::*;

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64::*;

#[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
compile_error!("fiberctx supports aarch64 and x86_64 only");
