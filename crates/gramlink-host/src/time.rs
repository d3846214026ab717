//! Where the link gets its timestamps.
//!
//! Only the link reads a clock: the background thread stamps every poll with it and
//! `Link::add_peer` stamps new peers. Everything below the link takes `now` as an
//! argument.

use std::time::Instant;

/// Source of `now` for a link. Tests can pin it to drive eviction by hand.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Monotonic wall time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_never_goes_back() {
        let clock = SystemClock;
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
