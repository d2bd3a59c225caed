/*!
 * Monotonic Clock
 * Clock seam so the deterministic test harness can drive time by hand
 */

use std::time::{Duration, Instant};

/// Source of monotonic time
pub trait Clock {
    /// Time elapsed since an arbitrary fixed epoch (for [`MonotonicClock`],
    /// clock construction). Never decreases.
    fn monotonic(&self) -> Duration;
}

/// Wall clock over `std::time::Instant`
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn monotonic(&self) -> Duration {
        self.start.elapsed()
    }
}
