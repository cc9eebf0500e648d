//! Monotonic clock abstraction.

use tokio::time::Instant;

/// Source of the monotonic milliseconds used for all deadline math.
///
/// The pending-Interest table uses the same clock for insertion and sweep,
/// so wall-clock jumps can never expire an entry at insertion time.
pub trait Clock: Send {
    /// Current monotonic time in milliseconds.
    fn now_ms(&self) -> i64;
}

/// Clock measuring elapsed time from its construction instant.
///
/// Backed by `tokio::time::Instant`, so tests running under paused time
/// observe the same timeline as the event loop's timer.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }
}
