use std::time::Instant;

use gramlink_core::{
    constants::{MULTIPART_TYPE, RESERVED_TYPE_THRESHOLD},
    error::{ErrorKind, Result},
};
use gramlink_protocol::{Block, Datagram, Message, MessageFlags, MultipartHeader};

use super::Peer;
use crate::{multipart_assembly::FragmentFate, peer_status::PeerStatus};

/// Outcome of handing a datagram to `Peer::receive_gram`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GramReceipt {
    /// Blocks were queued. `malformed` is set when the body was cut short.
    Accepted {
        /// Messages that became deliverable, reassembled ones included.
        delivered: usize,
        /// Whether part of the body had to be discarded.
        malformed: bool,
    },
    /// Retransmission of a reliable datagram that was already accepted.
    Duplicate,
    /// Unreliable datagram older than the newest sequence seen.
    Stale,
}

impl GramReceipt {
    /// Whether a reliable datagram with this receipt must be acknowledged.
    pub fn should_ack(&self) -> bool {
        !matches!(self, GramReceipt::Stale)
    }
}

impl Peer {
    /// Unpacks a datagram from this peer into the receive side.
    ///
    /// Liveness and `highest_sequence_seen` are updated before anything can reject the
    /// datagram. If accepting it would exceed `max_queue_bytes` the whole datagram is
    /// refused with `RecvOverflow`.
    ///
    /// Received messages report the reliability of the datagram that carried them: an
    /// unreliable message packed beside a reliable one arrives as reliable.
    pub fn receive_gram(&mut self, gram: &Datagram, now: Instant) -> Result<GramReceipt> {
        let sequence = gram.sequence();
        let stale = !gram.is_reliable() && sequence < self.highest_sequence_seen;
        self.touch(now);
        self.statistics.bytes_received += gram.wire_len() as u64;
        self.highest_sequence_seen = self.highest_sequence_seen.max(sequence);

        if stale {
            self.statistics.stale_drops += 1;
            tracing::trace!(
                "Discarding stale datagram {} from peer {} (seen {})",
                sequence,
                self.peer_id,
                self.highest_sequence_seen
            );
            return Ok(GramReceipt::Stale);
        }
        self.duplicates.expire(now);
        if gram.is_reliable() && self.duplicates.contains(sequence) {
            self.statistics.duplicate_drops += 1;
            return Ok(GramReceipt::Duplicate);
        }

        if let Some(cap) = self.limits.max_queue_bytes {
            let used = self.queued_recv_bytes();
            if used + gram.body().len() > cap as usize {
                self.status = PeerStatus::RecvOverflow;
                self.statistics.recv_overflows += 1;
                tracing::warn!(
                    "Peer {} receive queue full ({} + {} > {} bytes), discarding datagram {}",
                    self.peer_id,
                    used,
                    gram.body().len(),
                    cap,
                    sequence
                );
                return Err(ErrorKind::RecvOverflow);
            }
        }

        if gram.is_reliable() {
            self.duplicates.record(sequence, now);
        }

        // The wire carries reliability per datagram, so every message inherits it.
        let flags = MessageFlags { reliable: gram.is_reliable(), ..MessageFlags::UNRELIABLE };
        let mut delivered = 0;
        let mut malformed = false;
        for block in gram.blocks() {
            let outcome = block.and_then(|block| self.receive_block(block, sequence, flags, now));
            match outcome {
                Ok(count) => delivered += count,
                Err(err) => {
                    tracing::debug!(
                        "Discarding rest of datagram {} from peer {}: {}",
                        sequence,
                        self.peer_id,
                        err
                    );
                    malformed = true;
                    break;
                }
            }
        }
        if malformed {
            self.statistics.malformed += 1;
        }

        Ok(GramReceipt::Accepted { delivered, malformed })
    }

    fn receive_block(&mut self, block: Block<'_>, sequence: u32, flags: MessageFlags, now: Instant) -> Result<usize> {
        if block.kind == MULTIPART_TYPE {
            let (header, chunk) = MultipartHeader::parse(block.payload)?;
            match self.assembler.accept(&header, chunk, sequence, now) {
                FragmentFate::Buffered => {}
                FragmentFate::Repeated => return Ok(0),
                FragmentFate::SlotsFull | FragmentFate::Inconsistent => {
                    self.statistics.multipart_drops += 1;
                    return Ok(0);
                }
            }
            return Ok(self.check_multi_recv(now));
        }
        if block.kind >= RESERVED_TYPE_THRESHOLD {
            return Err(ErrorKind::MalformedDatagram(format!("reserved block type {:#04x}", block.kind)));
        }

        let message = Message::received(self.peer_id, block.kind, block.payload, flags, sequence);
        self.insert_received(message);
        Ok(1)
    }

    /// Moves every completed multipart stream into the receive queue and evicts stale
    /// ones. Returns how many messages were completed.
    pub fn check_multi_recv(&mut self, now: Instant) -> usize {
        let mut completed = 0;
        while let Some(message) = self.assembler.take_complete(self.peer_id) {
            self.insert_received(message);
            completed += 1;
        }
        self.statistics.multipart_drops += self.assembler.evict_stale(now) as u64;
        completed
    }

    /// Stable insert by sequence: equal sequences keep arrival order.
    fn insert_received(&mut self, message: Message) {
        let position = self.recv_queue.partition_point(|queued| queued.sequence() <= message.sequence());
        self.queued_recv_bytes += message.wire_size();
        self.statistics.messages_received += 1;
        self.recv_queue.insert(position, message);
    }

    /// Takes the lowest-sequence deliverable message.
    pub fn pop_message(&mut self) -> Option<Message> {
        let message = self.recv_queue.pop_front()?;
        self.queued_recv_bytes = self.queued_recv_bytes.saturating_sub(message.wire_size());
        Some(message)
    }
}
