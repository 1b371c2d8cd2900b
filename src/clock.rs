//! Timestamp sources for timelock comparisons.
//!
//! The ledger never waits. It asks a [`Clock`] for the current instant once per
//! call and compares that against stored proposal times.

use std::cell::Cell;

use crate::types::Timestamp;

/// Monotonically non-decreasing timestamp source.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall clock. Never reports a value earlier than one it already returned.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: Cell<Timestamp>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = Timestamp::now().max(self.last.get());
        self.last.set(now);
        now
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    // ignores attempts to move backwards
    pub fn set(&self, timestamp: Timestamp) {
        if timestamp > self.now.get() {
            self.now.set(timestamp);
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.set(self.now.get().plus_secs(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_and_never_rewinds() {
        let clock = ManualClock::new(Timestamp::from_secs(1_000));
        clock.advance(60);
        assert_eq!(clock.now(), Timestamp::from_secs(1_060));

        clock.set(Timestamp::from_secs(10));
        assert_eq!(clock.now(), Timestamp::from_secs(1_060));

        clock.set(Timestamp::from_secs(2_000));
        assert_eq!(clock.now(), Timestamp::from_secs(2_000));
    }

    #[test]
    fn system_clock_is_non_decreasing() {
        let clock = SystemClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
        assert!(first.as_secs() > 0);
    }
}
