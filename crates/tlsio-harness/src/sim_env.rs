//! Virtual clock for deterministic testing.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tlsio_core::env::Clock;

/// A point in virtual time, measured from the clock's creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the clock was created.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: SimInstant) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = SimInstant;

    fn add(self, rhs: Duration) -> SimInstant {
        SimInstant(self.0 + rhs)
    }
}

/// Simulation clock that only moves when told to.
///
/// - **Virtual Time**: `now()` returns the virtual time, which tests advance
///   instantly with [`SimClock::advance`]. Nothing ever sleeps.
///
/// - **Shared**: clones share the same timeline, so a test can keep one
///   handle while the connection owns another.
///
/// # Determinism
///
/// Virtual time starts at zero for every clock, so deadlines are reproducible
/// across runs and machines.
#[derive(Clone, Default)]
pub struct SimClock {
    now: Arc<Mutex<SimInstant>>,
}

impl SimClock {
    /// Create a clock at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = *now + by;
    }

    /// Time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.now().since_start()
    }
}

impl Clock for SimClock {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SimClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimClock").field("elapsed", &self.elapsed()).finish()
    }
}
