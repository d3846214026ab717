use std::{
    collections::VecDeque,
    fmt,
    net::SocketAddr,
    time::{Duration, Instant},
};

use gramlink_core::{
    config::{LinkConfig, PeerLimits},
    error::{ErrorKind, Result},
    PeerId,
};
use gramlink_protocol::Message;

use crate::{
    duplicate_filter::DuplicateFilter, multipart_assembly::MultipartAssembler,
    peer_status::PeerStatus, send_history::SendHistory, statistics::PeerStatistics,
};

mod composer;
mod fragmenter;
mod receiver;

pub use receiver::GramReceipt;

/// State the link keeps for one remote endpoint.
///
/// Every method takes the current time explicitly; the peer never reads a clock.
pub struct Peer {
    address: SocketAddr,
    peer_id: PeerId,
    config: LinkConfig,
    limits: PeerLimits,
    status: PeerStatus,

    /// Sequence stamped on the next outgoing datagram
    next_sequence: u32,
    /// Highest datagram sequence received from the remote side
    highest_sequence_seen: u32,
    last_receive_time: Instant,

    send_queue: VecDeque<Message>,
    multipart_send_queue: VecDeque<Message>,
    /// Wire bytes across both send queues
    queued_send_bytes: usize,

    /// Deliverable messages, ascending by sequence
    recv_queue: VecDeque<Message>,
    queued_recv_bytes: usize,
    assembler: MultipartAssembler,
    duplicates: DuplicateFilter,

    history: SendHistory,
    statistics: PeerStatistics,
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("address", &self.address)
            .field("peer_id", &self.peer_id)
            .field("status", &self.status)
            .field("next_sequence", &self.next_sequence)
            .field("highest_sequence_seen", &self.highest_sequence_seen)
            .field("send_queue", &self.send_queue.len())
            .field("multipart_send_queue", &self.multipart_send_queue.len())
            .field("recv_queue", &self.recv_queue.len())
            .field("multipart_in_progress", &self.assembler.in_progress())
            .finish()
    }
}

impl Peer {
    /// Creates a peer for `address`. Limits start from `config.peer_limits`.
    pub fn new(address: SocketAddr, peer_id: PeerId, config: &LinkConfig, now: Instant) -> Self {
        Self {
            address,
            peer_id,
            config: config.clone(),
            limits: config.peer_limits,
            status: PeerStatus::Ok,
            next_sequence: 1,
            highest_sequence_seen: 0,
            last_receive_time: now,
            send_queue: VecDeque::new(),
            multipart_send_queue: VecDeque::new(),
            queued_send_bytes: 0,
            recv_queue: VecDeque::new(),
            queued_recv_bytes: 0,
            assembler: MultipartAssembler::new(config.multipart_slots, config.multipart_timeout),
            duplicates: DuplicateFilter::new(config.duplicate_retention),
            history: SendHistory::default(),
            statistics: PeerStatistics::default(),
        }
    }

    /// Remote endpoint.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Id the link assigned.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Current throttles.
    pub fn limits(&self) -> PeerLimits {
        self.limits
    }

    /// Replaces the throttles. Queued data above a lowered cap stays queued.
    pub fn set_limits(&mut self, limits: PeerLimits) {
        self.limits = limits;
    }

    /// Overflow status since the last reset.
    pub fn status(&self) -> PeerStatus {
        self.status
    }

    /// Clears the overflow status.
    pub fn reset_status(&mut self) {
        self.status = PeerStatus::Ok;
    }

    /// Counters for this peer.
    pub fn statistics(&self) -> &PeerStatistics {
        &self.statistics
    }

    /// Highest datagram sequence received so far.
    pub fn highest_sequence_seen(&self) -> u32 {
        self.highest_sequence_seen
    }

    /// Last time anything arrived from this peer.
    pub fn last_receive_time(&self) -> Instant {
        self.last_receive_time
    }

    /// Whether nothing has arrived for longer than `timeout`.
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_receive_time) > timeout
    }

    /// Notes traffic that is not handed to `receive_gram`, such as acks.
    pub fn touch(&mut self, now: Instant) {
        self.last_receive_time = now;
        self.statistics.datagrams_received += 1;
    }

    /// Whether the rate limiter allows another datagram now.
    pub fn ok_to_send(&self, now: Instant) -> bool {
        self.history.ok_to_send(now, &self.limits)
    }

    /// Records a datagram of `wire_len` bytes handed to the socket.
    pub fn record_send(&mut self, now: Instant, wire_len: usize) {
        let bytes = wire_len + self.config.udp_overhead;
        self.history.record(now, bytes);
        self.statistics.datagrams_sent += 1;
        self.statistics.bytes_sent += bytes as u64;
    }

    /// Wire bytes waiting in the send queues.
    pub fn queued_send_bytes(&self) -> usize {
        self.queued_send_bytes
    }

    /// Bytes held on the receive side, partial multipart streams included.
    pub fn queued_recv_bytes(&self) -> usize {
        self.queued_recv_bytes + self.assembler.buffered_bytes()
    }

    /// Messages waiting in the regular send queue.
    pub fn send_queue_len(&self) -> usize {
        self.send_queue.len()
    }

    /// Fragments waiting in the scatter queue.
    pub fn multipart_send_queue_len(&self) -> usize {
        self.multipart_send_queue.len()
    }

    /// Messages ready for collaborators.
    pub fn recv_queue_len(&self) -> usize {
        self.recv_queue.len()
    }

    /// Multipart streams being reassembled.
    pub fn multipart_in_progress(&self) -> usize {
        self.assembler.in_progress()
    }

    /// Whether anything is waiting to be composed.
    pub fn has_outbound(&self) -> bool {
        !self.send_queue.is_empty() || !self.multipart_send_queue.is_empty()
    }

    fn allocate_sequence(&mut self) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        sequence
    }

    fn reserve_send_bytes(&mut self, bytes: usize) -> Result<()> {
        if let Some(cap) = self.limits.max_queue_bytes {
            if self.queued_send_bytes + bytes > cap as usize {
                self.status = PeerStatus::SendOverflow;
                self.statistics.send_overflows += 1;
                tracing::warn!(
                    "Peer {} send queue full ({} + {} > {} bytes), dropping message",
                    self.peer_id,
                    self.queued_send_bytes,
                    bytes,
                    cap
                );
                return Err(ErrorKind::SendOverflow);
            }
        }
        self.queued_send_bytes += bytes;
        Ok(())
    }

    fn release_send_bytes(&mut self, bytes: usize) {
        self.queued_send_bytes = self.queued_send_bytes.saturating_sub(bytes);
    }
}
