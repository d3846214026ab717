//! Reliable datagrams awaiting acknowledgement, and the lag estimate their acks feed.
//!
//! Every ack that matches a pending datagram yields one round-trip sample. Samples are
//! smoothed as `lag = 0.75 * lag + 0.25 * sample`. While the smoothed lag stays at or
//! below 100ms the resend interval is the configured floor; above it, the interval is
//! three times the lag.

use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use gramlink_core::error::ErrorKind;
use gramlink_protocol::Datagram;

const LAG_KEEP: f64 = 0.75;
const LAG_SAMPLE: f64 = 0.25;
const LAG_THRESHOLD_MS: f64 = 100.0;
const RESEND_LAG_MULTIPLIER: f64 = 3.0;

/// Work produced by one `PendingAcks::collect_due` pass.
#[derive(Debug, Default)]
pub struct RetryBatch {
    /// Copies of datagrams to transmit again; the tracked originals were updated.
    pub resend: Vec<Datagram>,
    /// Datagrams that ran out of retries and were removed.
    pub exhausted: Vec<Datagram>,
}

/// Sent reliable datagrams, keyed by `(address, sequence)`.
#[derive(Debug)]
pub struct PendingAcks {
    entries: Vec<Datagram>,
    lag_ms: f64,
    resend_interval: Duration,
    min_resend_interval: Duration,
}

impl PendingAcks {
    /// Creates an empty set using `min_resend_interval` as the resend floor.
    pub fn new(min_resend_interval: Duration) -> Self {
        Self { entries: Vec::new(), lag_ms: 0.0, resend_interval: min_resend_interval, min_resend_interval }
    }

    /// Starts waiting for the ack of a reliable datagram.
    pub fn track(&mut self, gram: Datagram) {
        debug_assert!(gram.is_reliable());
        self.entries.push(gram);
    }

    /// Matches an ack against the pending set.
    ///
    /// On a match the datagram is removed, the lag estimate updated and the round-trip
    /// sample returned. Unmatched acks (late or duplicated) change nothing.
    pub fn process_ack(&mut self, ack: &Datagram, now: Instant) -> Option<Duration> {
        let index = self
            .entries
            .iter()
            .position(|gram| gram.sequence() == ack.sequence() && gram.address() == ack.address())?;
        let acked = self.entries.swap_remove(index);
        let sample = now.saturating_duration_since(acked.last_send_time());
        self.observe(sample);
        Some(sample)
    }

    fn observe(&mut self, sample: Duration) {
        let sample_ms = sample.as_secs_f64() * 1000.0;
        self.lag_ms = LAG_KEEP * self.lag_ms + LAG_SAMPLE * sample_ms;
        self.resend_interval = if self.lag_ms > LAG_THRESHOLD_MS {
            Duration::from_secs_f64(self.lag_ms * RESEND_LAG_MULTIPLIER / 1000.0)
        } else {
            self.min_resend_interval
        };
    }

    /// Finds every datagram whose resend interval has elapsed.
    ///
    /// Those with budget left are copied into `resend` untouched; a retry is only spent
    /// once `mark_resent` confirms the copy went out. The rest are removed into
    /// `exhausted`.
    pub fn collect_due(&mut self, now: Instant) -> RetryBatch {
        let interval = self.resend_interval;
        let mut batch = RetryBatch::default();
        let mut index = 0;
        while index < self.entries.len() {
            let gram = &self.entries[index];
            if !gram.is_due(now, interval) {
                index += 1;
                continue;
            }
            if gram.retries_remaining() > 0 {
                batch.resend.push(gram.clone());
                index += 1;
            } else {
                let exhausted = self.entries.swap_remove(index);
                tracing::debug!(
                    "Giving up on {}: {}",
                    exhausted.address(),
                    ErrorKind::RetryExhausted(exhausted.sequence())
                );
                batch.exhausted.push(exhausted);
            }
        }
        batch
    }

    /// Spends one retry on a datagram that was just retransmitted.
    ///
    /// Returns false if it is no longer pending or had no budget left.
    pub fn mark_resent(&mut self, address: SocketAddr, sequence: u32, now: Instant) -> bool {
        self.entries
            .iter_mut()
            .find(|gram| gram.address() == address && gram.sequence() == sequence)
            .is_some_and(|gram| gram.retry(now))
    }

    /// Forgets everything sent to `address`. Returns how many were dropped.
    pub fn purge(&mut self, address: SocketAddr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|gram| gram.address() != address);
        before - self.entries.len()
    }

    /// Whether a datagram with `sequence` to `address` is still unacknowledged.
    pub fn contains(&self, address: SocketAddr, sequence: u32) -> bool {
        self.entries.iter().any(|gram| gram.address() == address && gram.sequence() == sequence)
    }

    /// Smoothed lag in milliseconds.
    pub fn lag_ms(&self) -> f64 {
        self.lag_ms
    }

    /// Current resend interval.
    pub fn resend_interval(&self) -> Duration {
        self.resend_interval
    }

    /// Number of datagrams awaiting an ack.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing awaits an ack.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
