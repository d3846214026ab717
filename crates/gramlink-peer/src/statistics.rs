//! Per-peer counters.
//!
//! These complement the link-wide counters: they say which endpoint is dropping,
//! duplicating or overflowing, which the aggregate numbers cannot.

/// Counters for one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerStatistics {
    /// Datagrams sent to this peer, retransmissions included
    pub datagrams_sent: u64,
    /// Datagrams received from this peer, acks included
    pub datagrams_received: u64,
    /// Bytes sent, UDP overhead included
    pub bytes_sent: u64,
    /// Datagram bytes received
    pub bytes_received: u64,
    /// Messages made available to collaborators
    pub messages_received: u64,
    /// Unreliable datagrams dropped for arriving behind a newer one
    pub stale_drops: u64,
    /// Reliable retransmissions that had already been accepted
    pub duplicate_drops: u64,
    /// Messages dropped because they could never fit a datagram
    pub oversized_drops: u64,
    /// Messages rejected by the send queue cap
    pub send_overflows: u64,
    /// Datagrams rejected by the receive queue cap
    pub recv_overflows: u64,
    /// Fragments dropped by multipart reassembly
    pub multipart_drops: u64,
    /// Datagrams whose body did not parse cleanly
    pub malformed: u64,
}
