//! Rate limiting over a short send history.
//!
//! The limiter remembers the last `SEND_HISTORY_LEN` sends as `(time, bytes)` pairs,
//! oldest first, and answers one question: may another datagram go out now?
//!
//! - **Packets per second**: the newest entry must be at least `1 / max_pps` seconds old.
//! - **Bytes per second**: the bytes in the window may not exceed `max_bps` times the
//!   time elapsed since the oldest entry. A burst is therefore paid for by waiting
//!   until the window has stretched enough to cover it.
//!
//! A failed check only defers the send. Nothing is dropped here.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use gramlink_core::{config::PeerLimits, constants::SEND_HISTORY_LEN};

/// Ring of the most recent sends to one peer.
#[derive(Debug, Clone)]
pub struct SendHistory {
    entries: VecDeque<(Instant, usize)>,
    capacity: usize,
}

impl Default for SendHistory {
    fn default() -> Self {
        Self::with_capacity(SEND_HISTORY_LEN)
    }
}

impl SendHistory {
    /// Creates a history remembering `capacity` sends.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity), capacity }
    }

    /// Records a send of `bytes` at `time`, forgetting the oldest entry when full.
    pub fn record(&mut self, time: Instant, bytes: usize) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((time, bytes));
    }

    /// Whether `limits` allow another send at `now`.
    pub fn ok_to_send(&self, now: Instant, limits: &PeerLimits) -> bool {
        if let (Some(pps), Some(&(newest, _))) = (limits.max_pps, self.entries.back()) {
            let gap = Duration::from_secs(1) / pps.max(1);
            if now.saturating_duration_since(newest) < gap {
                return false;
            }
        }

        if let (Some(bps), Some(&(oldest, _))) = (limits.max_bps, self.entries.front()) {
            let elapsed = now.saturating_duration_since(oldest).as_secs_f64();
            let sent = self.window_bytes() as f64;
            if sent > f64::from(bps) * elapsed {
                return false;
            }
        }

        true
    }

    /// Bytes recorded in the window.
    pub fn window_bytes(&self) -> usize {
        self.entries.iter().map(|&(_, bytes)| bytes).sum()
    }

    /// Number of sends remembered.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been sent yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_pps: Option<u32>, max_bps: Option<u32>) -> PeerLimits {
        PeerLimits { max_pps, max_bps, max_queue_bytes: None }
    }

    #[test]
    fn test_unlimited_always_allows() {
        let mut history = SendHistory::default();
        let now = Instant::now();
        for _ in 0..20 {
            history.record(now, 546);
        }
        assert!(history.ok_to_send(now, &PeerLimits::default()));
        assert_eq!(history.len(), SEND_HISTORY_LEN);
    }

    #[test]
    fn test_pps_spacing() {
        let mut history = SendHistory::default();
        let start = Instant::now();
        let limits = limits(Some(10), None);

        assert!(history.ok_to_send(start, &limits));
        history.record(start, 100);
        assert!(!history.ok_to_send(start + Duration::from_millis(50), &limits));
        assert!(history.ok_to_send(start + Duration::from_millis(100), &limits));
    }

    #[test]
    fn test_bps_waits_out_a_burst() {
        let mut history = SendHistory::default();
        let start = Instant::now();
        let limits = limits(None, Some(10_000));

        history.record(start, 546);
        assert!(!history.ok_to_send(start + Duration::from_millis(10), &limits));
        assert!(history.ok_to_send(start + Duration::from_millis(60), &limits));
    }

    #[test]
    fn test_window_forgets_oldest() {
        let mut history = SendHistory::with_capacity(2);
        let start = Instant::now();
        history.record(start, 1000);
        history.record(start + Duration::from_secs(1), 10);
        history.record(start + Duration::from_secs(2), 10);
        assert_eq!(history.window_bytes(), 20);
    }
}
