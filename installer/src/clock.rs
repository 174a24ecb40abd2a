//! Blocking pauses used by retry backoff and lock re-checks.

use std::time::Duration;

/// Capability for blocking the current thread.
///
/// The installer is strictly sequential, so every wait is a plain blocking
/// sleep. Tests inject a recording implementation to observe the schedule
/// without waiting.
#[cfg_attr(test, mockall::automock)]
pub trait Sleeper {
    /// Blocks for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
