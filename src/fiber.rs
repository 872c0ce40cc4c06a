//! Safe fiber API on top of the context primitive.
//!
//! A `Fiber` owns a stack and two contexts: its own, and the one of whoever
//! resumed it. Scheduling policy is left to the caller.
//!
//! # Example
//!
//! ```no_run
//! use fiberctx::{Fiber, FiberState};
//!
//! let mut fiber = Fiber::new(|s| {
//!     println!("step 1");
//!     s.suspend();
//!     println!("step 2");
//! })?;
//!
//! assert_eq!(fiber.resume(), FiberState::Suspended);
//! assert_eq!(fiber.resume(), FiberState::Finished);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::context::{RegisterContext, resume, switch};
use crate::stack::FiberStack;
use log::trace;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stack size for each fiber (64KB)
pub const STACK_SIZE: usize = 64 * 1024;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Fiber construction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiberConfig {
    /// Usable stack bytes (rounded up to whole pages)
    pub stack_size: usize,
    /// Map a PROT_NONE page below the stack
    pub guard_page: bool,
}

impl Default for FiberConfig {
    fn default() -> Self {
        FiberConfig {
            stack_size: STACK_SIZE,
            guard_page: true,
        }
    }
}

/// Where a fiber is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
    /// Bootstrapped, never resumed
    Created,
    /// Currently executing on its stack
    Running,
    /// Suspended at a `Suspender::suspend` call
    Suspended,
    /// Entry closure returned (or panicked)
    Finished,
}

type Entry = Box<dyn FnOnce(&Suspender)>;

/// State shared between the owning `Fiber` and the code running on it.
/// Heap-pinned: the bootstrap context carries its address.
struct Inner {
    id: u64,
    /// Saved state of the fiber itself
    context: RegisterContext,
    /// Saved state of the side that resumed the fiber
    caller: RegisterContext,
    entry: Option<Entry>,
    state: FiberState,
    panic: Option<Box<dyn Any + Send>>,
}

/// A stackful coroutine.
pub struct Fiber {
    inner: NonNull<Inner>,
    stack: FiberStack,
}

/// Handle given to the fiber body for suspending back to its resumer.
pub struct Suspender {
    inner: NonNull<Inner>,
}

impl Fiber {
    /// Create a fiber with the default configuration.
    pub fn new<F>(f: F) -> Result<Self, anyhow::Error>
    where
        F: FnOnce(&Suspender) + 'static,
    {
        Self::with_config(FiberConfig::default(), f)
    }

    /// Create a fiber running `f` on a freshly mapped stack.
    ///
    /// Nothing runs until the first `resume`.
    pub fn with_config<F>(config: FiberConfig, f: F) -> Result<Self, anyhow::Error>
    where
        F: FnOnce(&Suspender) + 'static,
    {
        let stack = FiberStack::with_guard(config.stack_size, config.guard_page)?;
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        let inner = Box::into_raw(Box::new(Inner {
            id,
            context: RegisterContext::zeroed(),
            caller: RegisterContext::zeroed(),
            entry: Some(Box::new(f)),
            state: FiberState::Created,
            panic: None,
        }));
        // SAFETY: just allocated, not yet shared
        unsafe {
            (*inner).context = RegisterContext::bootstrap(stack.top(), fiber_main, inner as usize);
        }

        trace!("fiber {} created, stack top {:#x}", id, stack.top());

        Ok(Fiber {
            // SAFETY: Box::into_raw never returns null
            inner: unsafe { NonNull::new_unchecked(inner) },
            stack,
        })
    }

    /// Run the fiber until it suspends or finishes.
    ///
    /// A panic inside the fiber is re-raised here.
    ///
    /// # Panics
    /// If the fiber has already finished or is the one currently running.
    pub fn resume(&mut self) -> FiberState {
        let inner = self.inner.as_ptr();

        unsafe {
            assert!(
                matches!((*inner).state, FiberState::Created | FiberState::Suspended),
                "fiber {} resumed while {:?}",
                (*inner).id,
                (*inner).state
            );
            trace!("fiber {} resumed", (*inner).id);
            (*inner).state = FiberState::Running;

            // Back here once the fiber suspends or finishes
            switch(&mut (*inner).caller, &(*inner).context);

            if let Some(payload) = (*inner).panic.take() {
                trace!("fiber {} panicked", (*inner).id);
                panic::resume_unwind(payload);
            }
            (*inner).state
        }
    }

    pub fn state(&self) -> FiberState {
        unsafe { self.inner.as_ref().state }
    }

    pub fn is_finished(&self) -> bool {
        self.state() == FiberState::Finished
    }

    pub fn id(&self) -> u64 {
        unsafe { self.inner.as_ref().id }
    }

    pub fn stack(&self) -> &FiberStack {
        &self.stack
    }
}

impl Drop for Fiber {
    fn drop(&mut self) {
        let inner = unsafe { Box::from_raw(self.inner.as_ptr()) };
        if inner.state == FiberState::Suspended {
            // No force-unwind: frames left on the stack are leaked.
            trace!("fiber {} abandoned while suspended", inner.id);
        }
        // `stack` is unmapped after this, once we are off it
    }
}

impl Suspender {
    /// Switch back to whoever resumed this fiber.
    ///
    /// Returns when the fiber is resumed again.
    pub fn suspend(&self) {
        let inner = self.inner.as_ptr();
        unsafe {
            trace!("fiber {} suspended", (*inner).id);
            (*inner).state = FiberState::Suspended;
            switch(&mut (*inner).context, &(*inner).caller);
        }
    }

    /// Id of the fiber this handle belongs to.
    pub fn id(&self) -> u64 {
        unsafe { self.inner.as_ref().id }
    }
}

/// Entry point for new fibers, called by the bootstrap trampoline.
extern "C" fn fiber_main(arg: usize) -> ! {
    let inner = arg as *mut Inner;
    let suspender = Suspender {
        // SAFETY: `arg` is the `Inner` pointer stored by `Fiber::with_config`
        inner: unsafe { NonNull::new_unchecked(inner) },
    };

    let entry = unsafe { (*inner).entry.take() };
    // Unwinding must not reach the trampoline
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        if let Some(f) = entry {
            f(&suspender);
        }
    }));

    unsafe {
        if let Err(payload) = result {
            (*inner).panic = Some(payload);
        }
        (*inner).state = FiberState::Finished;
        trace!("fiber {} finished", (*inner).id);

        // Never resumed again; the owner reclaims the stack
        resume(&(*inner).caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = FiberConfig::default();
        assert_eq!(config.stack_size, STACK_SIZE);
        assert!(config.guard_page);
    }

    #[test]
    fn created_fiber_has_not_run() -> Result<(), anyhow::Error> {
        let fiber = Fiber::new(|_| unreachable!("never resumed"))?;
        assert_eq!(fiber.state(), FiberState::Created);
        assert!(fiber.stack().size() >= STACK_SIZE);
        Ok(())
    }

    #[test]
    fn ids_are_unique() -> Result<(), anyhow::Error> {
        let a = Fiber::new(|_| {})?;
        let b = Fiber::new(|_| {})?;
        assert_ne!(a.id(), b.id());
        Ok(())
    }
}
