//! Link-wide diagnostic counters.
//!
//! Written by the I/O thread, read by anyone. Everything is a relaxed atomic: readers
//! want a recent figure, not a consistent cut across counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared between the I/O thread and the `Link` handle.
#[derive(Debug, Default)]
pub struct LinkCounters {
    packets_sent: AtomicU64,
    packets_recv: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_recv: AtomicU64,
    retries: AtomicU64,
    drops: AtomicU64,
    malformed: AtomicU64,
    /// Smoothed lag in milliseconds, stored as `f64` bits.
    lag_bits: AtomicU64,
}

/// Point-in-time copy of `LinkCounters`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CounterSnapshot {
    /// Datagrams written to the socket, acks and retries included.
    pub packets_sent: u64,
    /// Datagrams read from the socket.
    pub packets_recv: u64,
    /// Bytes written to the socket.
    pub bytes_sent: u64,
    /// Bytes read from the socket.
    pub bytes_recv: u64,
    /// Reliable datagrams retransmitted.
    pub retries: u64,
    /// Datagrams abandoned: retries exhausted, or unreliable and unsendable.
    pub drops: u64,
    /// Datagrams that failed to decode, fully or partly.
    pub malformed: u64,
    /// Smoothed round-trip lag in milliseconds.
    pub lag_ms: f64,
}

impl LinkCounters {
    pub(crate) fn record_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_recv(&self, bytes: usize) {
        self.packets_recv.fetch_add(1, Ordering::Relaxed);
        self.bytes_recv.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drops(&self, count: usize) {
        self.drops.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_lag_ms(&self, lag_ms: f64) {
        self.lag_bits.store(lag_ms.to_bits(), Ordering::Relaxed);
    }

    /// Smoothed lag in milliseconds.
    pub fn lag_ms(&self) -> f64 {
        f64::from_bits(self.lag_bits.load(Ordering::Relaxed))
    }

    /// Copies every counter.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_recv: self.packets_recv.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_recv: self.bytes_recv.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            lag_ms: self.lag_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        assert_eq!(LinkCounters::default().snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn test_accumulates() {
        let counters = LinkCounters::default();
        counters.record_sent(100);
        counters.record_sent(20);
        counters.record_recv(5);
        counters.record_retry();
        counters.record_drops(2);
        counters.set_lag_ms(87.5);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.packets_sent, 2);
        assert_eq!(snapshot.bytes_sent, 120);
        assert_eq!(snapshot.packets_recv, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.drops, 2);
        assert_eq!(snapshot.lag_ms, 87.5);
    }
}
