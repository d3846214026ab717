use std::{default::Default, time::Duration};

use crate::{
    constants::{
        BLOCK_HEADER_SIZE, DATAGRAM_HEADER_SIZE, DEFAULT_CHUNK_SIZE, DEFAULT_MULTIPART_SLOTS,
        MAX_BLOCK_PAYLOAD, MAX_DATAGRAM_SIZE, MULTIPART_HEADER_SIZE, UDP_OVERHEAD,
    },
    error::{ErrorKind, Result},
    PeerId,
};

/// Largest payload a UDP datagram can carry over IPv4.
const MAX_UDP_PAYLOAD: usize = 65_507;

/// Per-peer throttles. `None` disables the corresponding check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeerLimits {
    /// Datagrams per second the peer may be sent.
    pub max_pps: Option<u32>,
    /// Bytes per second (UDP overhead included) the peer may be sent.
    pub max_bps: Option<u32>,
    /// Cap on queued bytes, applied separately to the outbound and inbound side.
    pub max_queue_bytes: Option<u32>,
}

#[derive(Clone, Debug)]
/// Configuration options to tune the link and the peers it creates.
pub struct LinkConfig {
    /// Whole-datagram budget in bytes, including the sequence/flags header.
    pub max_datagram_size: usize,
    /// Per-datagram UDP/IP overhead counted by the bandwidth limiter.
    pub udp_overhead: usize,
    /// Payload bytes per multipart fragment. Larger messages are split.
    pub chunk_size: usize,
    /// Retry budget of every reliable datagram.
    pub max_retries: u8,
    /// Resend interval used while the smoothed lag stays at or below 100ms.
    pub min_resend_interval: Duration,
    /// Peers silent for longer than this are evicted.
    pub disconnect_timeout: Duration,
    /// Sleep between iterations of the I/O loop.
    pub poll_interval: Duration,
    /// Multipart streams reassembled concurrently per peer.
    pub multipart_slots: usize,
    /// Incomplete multipart streams older than this are evicted.
    pub multipart_timeout: Duration,
    /// How long an accepted reliable sequence is remembered, so a retransmission
    /// caused by a lost ack is not delivered twice. Must outlast the sender's whole
    /// retry span. Zero disables duplicate suppression.
    pub duplicate_retention: Duration,
    /// Limits applied to every newly created peer.
    pub peer_limits: PeerLimits,
    /// Id handed to the first peer; later peers count up from here.
    pub peer_id_base: PeerId,
    /// Bounded wait for the I/O thread when the link is shut down.
    pub shutdown_timeout: Duration,
    /// Socket receive buffer size in bytes (None = use system default).
    /// Corresponds to SO_RCVBUF socket option.
    pub socket_recv_buffer_size: Option<usize>,
    /// Socket send buffer size in bytes (None = use system default).
    /// Corresponds to SO_SNDBUF socket option.
    pub socket_send_buffer_size: Option<usize>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: MAX_DATAGRAM_SIZE,
            udp_overhead: UDP_OVERHEAD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: 5,
            min_resend_interval: Duration::from_millis(300),
            disconnect_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(50),
            multipart_slots: DEFAULT_MULTIPART_SLOTS,
            multipart_timeout: Duration::from_secs(30),
            duplicate_retention: Duration::from_secs(60),
            peer_limits: PeerLimits::default(),
            peer_id_base: 1,
            shutdown_timeout: Duration::from_secs(1),
            socket_recv_buffer_size: None,
            socket_send_buffer_size: None,
        }
    }
}

impl LinkConfig {
    /// Bytes available for blocks once the datagram header is accounted for.
    pub fn body_budget(&self) -> usize {
        self.max_datagram_size.saturating_sub(DATAGRAM_HEADER_SIZE)
    }

    /// Wire size of a block carrying one full multipart fragment.
    pub fn fragment_block_size(&self) -> usize {
        BLOCK_HEADER_SIZE + MULTIPART_HEADER_SIZE + self.chunk_size
    }

    /// Checks that every message the link accepts can be put on the wire.
    pub fn validate(&self) -> Result<()> {
        if self.max_datagram_size > MAX_UDP_PAYLOAD {
            return Err(ErrorKind::InvalidConfig(format!(
                "max_datagram_size {} exceeds the UDP payload limit {}",
                self.max_datagram_size, MAX_UDP_PAYLOAD
            )));
        }
        if self.chunk_size == 0 {
            return Err(ErrorKind::InvalidConfig("chunk_size must be positive".into()));
        }
        if MULTIPART_HEADER_SIZE + self.chunk_size > MAX_BLOCK_PAYLOAD {
            return Err(ErrorKind::InvalidConfig(format!(
                "chunk_size {} plus the {}-byte multipart header does not fit a {}-byte block",
                self.chunk_size, MULTIPART_HEADER_SIZE, MAX_BLOCK_PAYLOAD
            )));
        }
        if self.fragment_block_size() > self.body_budget() {
            return Err(ErrorKind::InvalidConfig(format!(
                "a {}-byte fragment block does not fit a {}-byte datagram",
                self.fragment_block_size(),
                self.max_datagram_size
            )));
        }
        if self.multipart_slots == 0 {
            return Err(ErrorKind::InvalidConfig("multipart_slots must be positive".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ErrorKind::InvalidConfig("poll_interval must be positive".into()));
        }
        let retry_span =
            self.min_resend_interval.checked_mul(u32::from(self.max_retries) + 1).unwrap_or(Duration::MAX);
        if !self.duplicate_retention.is_zero() && self.duplicate_retention < retry_span {
            return Err(ErrorKind::InvalidConfig(format!(
                "duplicate_retention {:?} is shorter than the minimum retry span {:?}",
                self.duplicate_retention, retry_span
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LinkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.body_budget(), 507);
        assert_eq!(config.fragment_block_size(), 250);
    }

    #[test]
    fn test_rejects_chunk_larger_than_block() {
        let config = LinkConfig { chunk_size: 240, ..Default::default() };
        assert!(matches!(config.validate(), Err(ErrorKind::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_datagram_too_small_for_fragment() {
        let config = LinkConfig { max_datagram_size: 200, ..Default::default() };
        assert!(matches!(config.validate(), Err(ErrorKind::InvalidConfig(_))));

        let smaller_chunks = LinkConfig { max_datagram_size: 200, chunk_size: 100, ..Default::default() };
        assert!(smaller_chunks.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_values() {
        assert!(LinkConfig { chunk_size: 0, ..Default::default() }.validate().is_err());
        assert!(LinkConfig { multipart_slots: 0, ..Default::default() }.validate().is_err());
        assert!(LinkConfig { poll_interval: Duration::ZERO, ..Default::default() }.validate().is_err());
    }

    #[test]
    fn test_duplicate_retention_must_cover_retries() {
        // 300ms floor, 5 retries: the last copy can leave 1.8s after the first.
        let short = LinkConfig { duplicate_retention: Duration::from_secs(1), ..Default::default() };
        assert!(short.validate().is_err());

        let enough = LinkConfig { duplicate_retention: Duration::from_millis(1800), ..Default::default() };
        assert!(enough.validate().is_ok());

        let disabled = LinkConfig { duplicate_retention: Duration::ZERO, ..Default::default() };
        assert!(disabled.validate().is_ok());
    }
}
