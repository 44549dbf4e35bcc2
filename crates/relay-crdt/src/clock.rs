//! Lamport clock and operation identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A Lamport logical clock.
///
/// Local operations draw fresh counters with [`tick`](Self::tick) or
/// [`reserve`](Self::reserve); remote operations push the clock forward
/// with [`observe`](Self::observe) so later local ids sort after
/// everything already seen.
///
/// ```rust
/// use relay_crdt::LamportClock;
///
/// let mut clock = LamportClock::new();
/// assert_eq!(clock.tick(), 1);
/// assert_eq!(clock.reserve(3), 2); // counters 2, 3 and 4
/// clock.observe(10);
/// assert_eq!(clock.tick(), 11);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LamportClock {
    value: u64,
}

impl LamportClock {
    /// Creates a new clock initialized to 0.
    #[must_use]
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Creates a clock with a specific initial value.
    #[must_use]
    pub const fn with_value(value: u64) -> Self {
        Self { value }
    }

    /// Returns the current clock value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Increments the clock for a local event and returns the new value.
    pub fn tick(&mut self) -> u64 {
        self.value += 1;
        self.value
    }

    /// Reserves `n` consecutive counters and returns the first.
    ///
    /// `n = 0` reserves nothing and returns the next unused counter.
    pub fn reserve(&mut self, n: u64) -> u64 {
        let first = self.value + 1;
        self.value += n;
        first
    }

    /// Records a counter seen on a remote operation.
    pub fn observe(&mut self, counter: u64) {
        self.value = self.value.max(counter);
    }
}

/// Identity of one inserted character.
///
/// Ordered by counter first, replica second. Among concurrent inserts at
/// the same position the greater id is placed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpId {
    /// Lamport counter.
    pub counter: u64,
    /// Replica that created the character.
    pub replica: u64,
}

impl OpId {
    /// Build an id.
    #[must_use]
    pub const fn new(counter: u64, replica: u64) -> Self {
        Self { counter, replica }
    }

    /// Id of the `offset`-th character of a run starting at `self`.
    #[must_use]
    pub const fn offset(self, offset: u64) -> Self {
        Self {
            counter: self.counter + offset,
            replica: self.replica,
        }
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:x}", self.counter, self.replica)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock_starts_at_zero() {
        assert_eq!(LamportClock::new().value(), 0);
    }

    #[test]
    fn test_reserve_hands_out_consecutive_counters() {
        let mut clock = LamportClock::with_value(4);
        assert_eq!(clock.reserve(5), 5);
        assert_eq!(clock.value(), 9);
        assert_eq!(clock.reserve(0), 10);
        assert_eq!(clock.value(), 9);
    }

    #[test]
    fn test_observe_never_moves_backwards() {
        let mut clock = LamportClock::with_value(7);
        clock.observe(3);
        assert_eq!(clock.value(), 7);
        clock.observe(12);
        assert_eq!(clock.value(), 12);
    }

    #[test]
    fn test_opid_order_counter_then_replica() {
        assert!(OpId::new(1, 9) < OpId::new(2, 0));
        assert!(OpId::new(2, 1) < OpId::new(2, 3));
        assert_eq!(OpId::new(5, 2).offset(3), OpId::new(8, 2));
    }
}
