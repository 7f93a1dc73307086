//! Time source for gain ramps

use std::time::Duration;
use tokio::time::Instant;

/// Monotonic time since an arbitrary origin
pub trait Clock: Send {
    fn now(&self) -> Duration;
}

/// Clock backed by tokio's instant, so paused test time applies to it
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
