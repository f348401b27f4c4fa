//! Deadline arithmetic shared by every bounded operation.
//!
//! The connection arms one deadline when `open` is called and reuses it for
//! DNS, connect and handshake. The send queue arms a separate deadline for
//! each message when it first becomes head-of-queue.

use std::time::Duration;

/// A point after which an in-flight operation is considered timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline<I> {
    started: I,
    window: Duration,
}

impl<I> Deadline<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Arm a deadline `window` after `now`.
    pub fn start(now: I, window: Duration) -> Self {
        Self { started: now, window }
    }

    /// Time elapsed since the deadline was armed.
    ///
    /// Saturates to zero if `now` is earlier than the arming instant.
    #[must_use]
    pub fn elapsed(&self, now: I) -> Duration {
        if now <= self.started { Duration::ZERO } else { now - self.started }
    }

    /// Returns `Some(elapsed)` once strictly more than `window` has passed.
    #[must_use]
    pub fn check(&self, now: I) -> Option<Duration> {
        let elapsed = self.elapsed(now);
        if elapsed > self.window { Some(elapsed) } else { None }
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self, now: I) -> bool {
        self.check(now).is_some()
    }

    /// The configured window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}
