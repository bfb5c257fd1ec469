//! Injectable monotonic time source (design notes §9).
//!
//! Aging is measured against a monotonic clock so that tests — and
//! `vea-sim`'s deterministic workloads — can advance time explicitly instead
//! of sleeping in real time.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A source of monotonically non-decreasing timestamps.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The OS monotonic clock. Default for production use.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only advances when told to. Not thread-safe by design —
/// VEA itself is single-threaded per space (spec §5), so a `Cell` is enough.
/// Cloning shares the same underlying counter (via `Rc`), so a test can hand
/// one handle to a `VeaSpace` and keep another to drive it forward.
#[derive(Debug, Clone)]
pub struct FakeClock {
    current: Rc<Cell<Instant>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.current.set(self.current.get() + by);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.current.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_only_advances_when_told() {
        let clock = FakeClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), t0 + Duration::from_secs(5));
    }
}
