/*! Time structures.

The stack has no timers. Everything that ages (sessions, ARP entries, pending reassemblies) is
measured against an external tick counter that the embedder advances.

 - [Tick] is a point on that counter.
 - [Ticks] is the shared counter itself.
 - [Expiration] is a deadline in ticks, or none at all.

Wall-clock waits of the blocking client operations use `std::time` directly.

[Tick]: struct.Tick.html
[Ticks]: struct.Ticks.html
[Expiration]: enum.Expiration.html
*/
use core::{fmt, ops};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A point on the monotonic tick counter.
///
/// A value of `0` is inherently arbitrary, it is simply where the counter started.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(pub u64);

/// A deadline in ticks. Any deadline orders before `Never`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Expiration {
    /// Expires after the contained tick.
    When(Tick),
    /// Never expires.
    Never,
}

use Expiration::{When, Never};

/// A shared, monotonically increasing tick counter.
///
/// Clones share the same counter.
#[derive(Clone, Debug, Default)]
pub struct Ticks {
    inner: Arc<AtomicU64>,
}

impl Tick {
    /// The number of ticks that passed from `earlier` to `self`.
    ///
    /// Saturates at zero when `earlier` is actually later.
    pub fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Whether more than `timeout` ticks passed between `last` and `self`.
    pub fn is_expired(self, last: Tick, timeout: u64) -> bool {
        self.since(last) > timeout
    }
}

impl Ticks {
    /// Start a new counter at zero.
    pub fn new() -> Self {
        Ticks::default()
    }

    /// Sample the current tick.
    pub fn now(&self) -> Tick {
        Tick(self.inner.load(Ordering::Acquire))
    }

    /// Advance the counter by some ticks.
    pub fn advance(&self, by: u64) -> Tick {
        Tick(self.inner.fetch_add(by, Ordering::AcqRel).saturating_add(by))
    }

    /// Move the counter forward to `tick`.
    ///
    /// The counter never moves backwards, an earlier value is ignored.
    pub fn set(&self, tick: Tick) {
        self.inner.fetch_max(tick.0, Ordering::AcqRel);
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}t", self.0)
    }
}

impl ops::Add<u64> for Tick {
    type Output = Tick;

    fn add(self, rhs: u64) -> Tick {
        Tick(self.0.saturating_add(rhs))
    }
}

impl ops::AddAssign<u64> for Tick {
    fn add_assign(&mut self, rhs: u64) {
        self.0 = self.0.saturating_add(rhs);
    }
}

impl Expiration {
    /// Whether the deadline still lies in the future at `now`, or is exactly `now`.
    pub fn is_live(self, now: Tick) -> bool {
        When(now) <= self
    }
}

impl Default for Expiration {
    fn default() -> Self {
        Expiration::Never
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tick_ops() {
        assert_eq!(Tick(4) + 6, Tick(10));
        assert_eq!(Tick(10).since(Tick(4)), 6);
        assert_eq!(Tick(4).since(Tick(10)), 0);
        assert!(!Tick(124).is_expired(Tick(4), 120));
        assert!(Tick(125).is_expired(Tick(4), 120));
    }

    #[test]
    fn tick_display() {
        assert_eq!(format!("{}", Tick(5674)), "5674t");
    }

    #[test]
    fn shared_counter() {
        let ticks = Ticks::new();
        let other = ticks.clone();
        assert_eq!(ticks.advance(3), Tick(3));
        assert_eq!(other.now(), Tick(3));
        other.set(Tick(10));
        other.set(Tick(7));
        assert_eq!(ticks.now(), Tick(10));
    }

    #[test]
    fn expiration_order() {
        assert!(When(Tick(3)) < Never);
        assert!(When(Tick(3)).is_live(Tick(3)));
        assert!(!When(Tick(3)).is_live(Tick(4)));
        assert!(Never.is_live(Tick(u64::max_value())));
        assert_eq!(Expiration::default(), Never);
    }
}
