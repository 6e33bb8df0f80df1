//! Standard library implementations of platform traits.
//!
//! These back the defaults when a host supplies no providers.

use super::{RandomProvider, TimeProvider};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Time provider using `std::time::Instant`.
pub struct StdTimeProvider {
    /// Reference instant; times are reported relative to it
    epoch: Instant,
}

impl StdTimeProvider {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for StdTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for StdTimeProvider {
    fn now_millis(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Random provider using a simple xorshift64 PRNG.
///
/// It's seeded from the current time on creation.
pub struct StdRandomProvider {
    state: u64,
}

impl StdRandomProvider {
    /// Create a new StdRandomProvider with time-based seed.
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x12345678_9abcdef0);
        Self::with_seed(seed)
    }

    /// Create with a specific seed (for reproducible runs).
    pub fn with_seed(seed: u64) -> Self {
        // xorshift never leaves zero
        let seed = if seed == 0 { 0x12345678_9abcdef0 } else { seed };
        Self { state: seed }
    }
}

impl Default for StdRandomProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomProvider for StdRandomProvider {
    fn random(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;

        // Upper 53 bits as the mantissa
        let mantissa = x >> 11;
        (mantissa as f64) / ((1u64 << 53) as f64)
    }
}
