//! Duplicate suppression for reliable datagrams.
//!
//! When an ack is lost the sender retransmits a datagram the receiver already queued.
//! The filter remembers every reliable sequence accepted from a peer for a fixed
//! retention, long enough to outlive the sender's retries, so the retransmission can
//! be acked again without being delivered twice. How many datagrams arrive in that
//! time does not matter.

use std::{
    collections::{HashSet, VecDeque},
    time::{Duration, Instant},
};

/// Recently accepted sequences, expired by age.
#[derive(Debug, Clone)]
pub struct DuplicateFilter {
    /// Acceptance order; times are non-decreasing
    order: VecDeque<(Instant, u32)>,
    seen: HashSet<u32>,
    retention: Duration,
}

impl DuplicateFilter {
    /// Creates a filter remembering sequences for `retention`. Zero disables it.
    pub fn new(retention: Duration) -> Self {
        Self { order: VecDeque::new(), seen: HashSet::new(), retention }
    }

    /// Whether `sequence` was accepted within the retention.
    ///
    /// Call `expire` first so entries past the retention are not reported.
    pub fn contains(&self, sequence: u32) -> bool {
        self.seen.contains(&sequence)
    }

    /// Remembers `sequence` as accepted at `now`.
    pub fn record(&mut self, sequence: u32, now: Instant) {
        if self.retention.is_zero() || !self.seen.insert(sequence) {
            return;
        }
        let now = self.order.back().map_or(now, |&(last, _)| last.max(now));
        self.order.push_back((now, sequence));
    }

    /// Forgets sequences accepted longer than the retention before `now`.
    pub fn expire(&mut self, now: Instant) {
        while let Some(&(accepted, sequence)) = self.order.front() {
            if now.saturating_duration_since(accepted) <= self.retention {
                break;
            }
            self.order.pop_front();
            self.seen.remove(&sequence);
        }
    }

    /// Number of sequences remembered.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
