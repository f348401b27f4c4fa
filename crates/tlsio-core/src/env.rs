//! Clock abstraction for deterministic testing.
//!
//! The `Clock` trait decouples the state machine from the system clock. Every
//! deadline in this crate is computed from `Clock::now()`, never from
//! `std::time::Instant::now()` directly.
//!
//! The clock is implemented twice:
//!
//! 1. `SimClock` (tlsio-harness): virtual time advanced explicitly by tests
//! 2. `SystemClock` (tlsio-net): the real monotonic clock
//!
//! # Invariants
//!
//! - Monotonicity: `clock.now()` must never go backwards
//! - Isolation: implementations must not share global state

use std::time::Duration;

/// Source of the current time.
///
/// # Type Parameters
///
/// - `Instant`: a point in time. In simulation this is a virtual instant, in
///   production it is `std::time::Instant`.
///
/// Implementations MUST guarantee that `now()` never decreases within a
/// single connection's lifetime. A clock that jumps backwards makes deadlines
/// appear to never expire, which is safe but stalls timeout detection.
pub trait Clock {
    /// Type representing a point in time.
    ///
    /// Must support:
    /// - `Copy` - lightweight to store in deadlines
    /// - `Ord` - can be compared
    /// - `Sub<Output = Duration>` - can compute elapsed time
    type Instant: Copy + Ord + std::fmt::Debug + std::ops::Sub<Output = Duration>;

    /// Returns the current time.
    fn now(&self) -> Self::Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    type Instant = C::Instant;

    fn now(&self) -> Self::Instant {
        (**self).now()
    }
}
