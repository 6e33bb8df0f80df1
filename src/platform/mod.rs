//! Platform abstraction traits
//!
//! The VM never reads the wall clock or an RNG directly; hosts hand it
//! providers through [`crate::VmOptions`]. Interval scheduling and the pause
//! bookkeeping both read the same [`TimeProvider`].

mod std_impl;

pub use std_impl::{StdRandomProvider, StdTimeProvider};

use std::cell::Cell;
use std::rc::Rc;

/// Source of monotonic time.
pub trait TimeProvider {
    /// Milliseconds since an arbitrary fixed origin. Must never go backwards.
    fn now_millis(&self) -> u64;
}

/// Trait for providing random number generation.
///
/// Used by the `Random` opcode.
pub trait RandomProvider {
    /// Generate a random f64 in the range [0, 1).
    fn random(&mut self) -> f64;
}

/// A time provider frozen at zero.
pub struct NoOpTimeProvider;

impl TimeProvider for NoOpTimeProvider {
    fn now_millis(&self) -> u64 {
        0
    }
}

/// A random provider that always returns the same value.
pub struct NoOpRandomProvider;

impl RandomProvider for NoOpRandomProvider {
    fn random(&mut self) -> f64 {
        0.5
    }
}

/// Host-driven clock.
///
/// Clones share the same time, so a host can keep one handle and give the
/// other to the VM:
///
/// ```
/// use avm::platform::{ManualClock, TimeProvider};
///
/// let clock = ManualClock::new(0);
/// let handle = clock.clone();
/// handle.advance(250);
/// assert_eq!(clock.now_millis(), 250);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    /// Jump to an absolute time; earlier values are ignored
    pub fn set(&self, millis: u64) {
        self.now.set(self.now.get().max(millis));
    }

    pub fn advance(&self, millis: u64) {
        self.now.set(self.now.get().saturating_add(millis));
    }
}

impl TimeProvider for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.get()
    }
}
