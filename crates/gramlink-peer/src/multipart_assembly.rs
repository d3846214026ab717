//! Bounded multipart reassembly.
//!
//! Fragments arrive as `(MultipartHeader, chunk)` pairs and are grouped by `msg_id` into
//! a fixed number of slots. A slot completes once every part from 1 to `total_parts`
//! has arrived, in any order, and is then concatenated in `part_no` order.
//!
//! The table never grows past its slot count. A fragment for a new stream while all
//! slots are busy is dropped. Slots that stay incomplete longer than the timeout are
//! evicted so a lost fragment cannot pin a slot forever.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use gramlink_core::PeerId;
use gramlink_protocol::{Message, MessageFlags, MultipartHeader};

/// What happened to a fragment handed to the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentFate {
    /// Stored in its slot.
    Buffered,
    /// Same part already stored; ignored.
    Repeated,
    /// Every slot is busy with other streams; dropped.
    SlotsFull,
    /// Header disagrees with the stream's earlier fragments; dropped.
    Inconsistent,
}

/// Fragments of one message collected so far.
#[derive(Debug)]
struct Assembly {
    msg_id: u32,
    inner_kind: u8,
    flags: MessageFlags,
    total_parts: u16,
    total_len: u32,
    parts: BTreeMap<u16, Vec<u8>>,
    buffered_bytes: usize,
    max_sequence: u32,
    started_at: Instant,
}

impl Assembly {
    fn new(header: &MultipartHeader, started_at: Instant) -> Self {
        Self {
            msg_id: header.msg_id,
            inner_kind: header.inner_kind,
            flags: header.flags,
            total_parts: header.total_parts,
            total_len: header.total_len,
            parts: BTreeMap::new(),
            buffered_bytes: 0,
            max_sequence: 0,
            started_at,
        }
    }

    fn matches(&self, header: &MultipartHeader) -> bool {
        self.total_parts == header.total_parts
            && self.total_len == header.total_len
            && self.inner_kind == header.inner_kind
    }

    fn is_complete(&self) -> bool {
        self.parts.len() == self.total_parts as usize
    }

    /// Concatenates the parts in order. `None` if the sizes do not add up.
    fn reassemble(self, peer_id: PeerId) -> Option<Message> {
        let mut payload = Vec::with_capacity(self.total_len as usize);
        for chunk in self.parts.into_values() {
            payload.extend_from_slice(&chunk);
        }
        if payload.len() != self.total_len as usize {
            tracing::debug!(
                "Multipart message {} reassembled to {} bytes, header promised {}",
                self.msg_id,
                payload.len(),
                self.total_len
            );
            return None;
        }
        Some(Message::received(peer_id, self.inner_kind, payload, self.flags, self.max_sequence))
    }
}

/// Per-peer reassembly table.
#[derive(Debug)]
pub struct MultipartAssembler {
    slots: Vec<Assembly>,
    capacity: usize,
    timeout: Duration,
}

impl MultipartAssembler {
    /// Creates an assembler with `capacity` concurrent streams.
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self { slots: Vec::with_capacity(capacity), capacity, timeout }
    }

    /// Files one fragment carried by the datagram with `sequence`.
    pub fn accept(
        &mut self,
        header: &MultipartHeader,
        chunk: &[u8],
        sequence: u32,
        now: Instant,
    ) -> FragmentFate {
        let index = match self.slots.iter().position(|slot| slot.msg_id == header.msg_id) {
            Some(index) => index,
            None if self.slots.len() >= self.capacity => {
                tracing::warn!(
                    "All {} multipart slots busy, dropping fragment of message {}",
                    self.capacity,
                    header.msg_id
                );
                return FragmentFate::SlotsFull;
            }
            None => {
                self.slots.push(Assembly::new(header, now));
                self.slots.len() - 1
            }
        };

        let slot = &mut self.slots[index];
        if !slot.matches(header) {
            return FragmentFate::Inconsistent;
        }
        if slot.parts.contains_key(&header.part_no) {
            return FragmentFate::Repeated;
        }
        slot.buffered_bytes += chunk.len();
        slot.max_sequence = slot.max_sequence.max(sequence);
        slot.parts.insert(header.part_no, chunk.to_vec());
        FragmentFate::Buffered
    }

    /// Removes and returns the next completed message, if any.
    ///
    /// Completed streams whose sizes do not add up are discarded along the way.
    pub fn take_complete(&mut self, peer_id: PeerId) -> Option<Message> {
        while let Some(index) = self.slots.iter().position(Assembly::is_complete) {
            let assembly = self.slots.swap_remove(index);
            if let Some(message) = assembly.reassemble(peer_id) {
                return Some(message);
            }
        }
        None
    }

    /// Evicts streams that have been incomplete for longer than the timeout.
    /// Returns how many were evicted.
    pub fn evict_stale(&mut self, now: Instant) -> usize {
        let before = self.slots.len();
        let timeout = self.timeout;
        self.slots.retain(|slot| now.saturating_duration_since(slot.started_at) <= timeout);
        let evicted = before - self.slots.len();
        if evicted > 0 {
            tracing::warn!(
                "Evicted {} multipart stream(s) incomplete after {:?}",
                evicted,
                self.timeout
            );
        }
        evicted
    }

    /// Bytes held by incomplete streams.
    pub fn buffered_bytes(&self) -> usize {
        self.slots.iter().map(|slot| slot.buffered_bytes).sum()
    }

    /// Number of streams in progress.
    pub fn in_progress(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(msg_id: u32, part_no: u16, total_parts: u16, total_len: u32) -> MultipartHeader {
        MultipartHeader {
            inner_kind: 12,
            flags: MessageFlags::RELIABLE,
            msg_id,
            part_no,
            total_parts,
            total_len,
        }
    }

    #[test]
    fn test_out_of_order_parts_complete() {
        let mut assembler = MultipartAssembler::new(8, Duration::from_secs(30));
        let now = Instant::now();

        assert_eq!(assembler.accept(&header(1, 2, 3, 7), b"cd", 11, now), FragmentFate::Buffered);
        assert_eq!(assembler.accept(&header(1, 3, 3, 7), b"efg", 12, now), FragmentFate::Buffered);
        assert!(assembler.take_complete(4).is_none());
        assert_eq!(assembler.accept(&header(1, 1, 3, 7), b"ab", 10, now), FragmentFate::Buffered);

        let message = assembler.take_complete(4).unwrap();
        assert_eq!(message.payload(), b"abcdefg");
        assert_eq!(message.kind(), 12);
        assert_eq!(message.sequence(), 12);
        assert_eq!(message.peer_id(), 4);
        assert!(message.is_reliable());
        assert_eq!(assembler.in_progress(), 0);
    }

    #[test]
    fn test_repeated_part_is_ignored() {
        let mut assembler = MultipartAssembler::new(8, Duration::from_secs(30));
        let now = Instant::now();
        assembler.accept(&header(1, 1, 2, 4), b"ab", 1, now);
        assert_eq!(assembler.accept(&header(1, 1, 2, 4), b"ab", 2, now), FragmentFate::Repeated);
        assert_eq!(assembler.buffered_bytes(), 2);
    }

    #[test]
    fn test_slots_full_drops_new_stream() {
        let mut assembler = MultipartAssembler::new(2, Duration::from_secs(30));
        let now = Instant::now();
        assembler.accept(&header(1, 1, 2, 4), b"ab", 1, now);
        assembler.accept(&header(2, 1, 2, 4), b"ab", 2, now);
        assert_eq!(assembler.accept(&header(3, 1, 2, 4), b"ab", 3, now), FragmentFate::SlotsFull);
        assert_eq!(assembler.accept(&header(1, 2, 2, 4), b"cd", 4, now), FragmentFate::Buffered);
    }

    #[test]
    fn test_inconsistent_header_dropped() {
        let mut assembler = MultipartAssembler::new(2, Duration::from_secs(30));
        let now = Instant::now();
        assembler.accept(&header(1, 1, 2, 4), b"ab", 1, now);
        assert_eq!(assembler.accept(&header(1, 2, 3, 4), b"cd", 2, now), FragmentFate::Inconsistent);
    }

    #[test]
    fn test_length_mismatch_discarded() {
        let mut assembler = MultipartAssembler::new(2, Duration::from_secs(30));
        let now = Instant::now();
        assembler.accept(&header(1, 1, 2, 10), b"ab", 1, now);
        assembler.accept(&header(1, 2, 2, 10), b"cd", 2, now);
        assert!(assembler.take_complete(1).is_none());
        assert_eq!(assembler.in_progress(), 0);
    }

    #[test]
    fn test_stale_streams_evicted() {
        let mut assembler = MultipartAssembler::new(2, Duration::from_secs(5));
        let start = Instant::now();
        assembler.accept(&header(1, 1, 2, 4), b"ab", 1, start);
        assembler.accept(&header(2, 1, 2, 4), b"ab", 2, start + Duration::from_secs(4));

        assert_eq!(assembler.evict_stale(start + Duration::from_secs(6)), 1);
        assert_eq!(assembler.in_progress(), 1);
        assert_eq!(assembler.accept(&header(3, 1, 2, 4), b"ab", 3, start), FragmentFate::Buffered);
    }
}
