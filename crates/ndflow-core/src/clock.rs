//! The pipeline's monotonic logical clock.
//!
//! Every mutation in a pipeline instance (a stage parameter change, a
//! data object's metadata or buffer changing) draws a fresh [`Stamp`]
//! from one shared [`PipelineClock`]. Staleness checks compare stamps,
//! never wall time. The clock is owned by the pipeline and handed to
//! nodes explicitly; it is not process-global state.

use std::sync::atomic::{AtomicU64, Ordering};

/// A logical timestamp drawn from a [`PipelineClock`].
///
/// Stamps are totally ordered and monotonically increasing within one
/// pipeline. `Stamp(0)` is the "never" value: fresh data objects and
/// never-executed stages start there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Stamp(pub u64);

impl Stamp {
    /// The initial stamp, older than anything the clock will produce.
    pub const NEVER: Stamp = Stamp(0);
}

impl std::fmt::Display for Stamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic logical clock, one per pipeline instance.
///
/// Monotonically increasing. Never wraps in practice (u64 overflow at
/// one bump per nanosecond would take ~585 years).
#[derive(Debug, Default)]
pub struct PipelineClock {
    current: AtomicU64,
}

// Compile-time assertion: PipelineClock must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<PipelineClock>();
};

impl PipelineClock {
    /// Create a new clock starting at [`Stamp::NEVER`].
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
        }
    }

    /// Advance the clock and return the new stamp.
    pub fn tick(&self) -> Stamp {
        Stamp(self.current.fetch_add(1, Ordering::Release) + 1)
    }

    /// Read the current stamp without advancing.
    pub fn current(&self) -> Stamp {
        Stamp(self.current.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_strictly_increasing() {
        let clock = PipelineClock::new();
        let a = clock.tick();
        let b = clock.tick();
        assert!(Stamp::NEVER < a);
        assert!(a < b);
        assert_eq!(clock.current(), b);
    }

    #[test]
    fn never_is_older_than_first_tick() {
        let clock = PipelineClock::new();
        assert_eq!(clock.current(), Stamp::NEVER);
        assert!(clock.tick() > Stamp::NEVER);
    }
}
