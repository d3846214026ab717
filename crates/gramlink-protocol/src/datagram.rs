use std::{
    io::{Cursor, Write},
    net::SocketAddr,
    time::{Duration, Instant},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use gramlink_core::{
    constants::{DATAGRAM_HEADER_SIZE, FLAG_ACK, FLAG_RELIABLE},
    error::{ErrorKind, Result},
};

use crate::{
    block::{write_block, BlockReader},
    message::Message,
};

/// One UDP payload's worth of framed transport data.
///
/// Apart from the retry bookkeeping a datagram is immutable once packed.
#[derive(Clone, Debug)]
pub struct Datagram {
    address: SocketAddr,
    sequence: u32,
    reliable: bool,
    is_ack: bool,
    retries_remaining: u8,
    last_send_time: Instant,
    body: Vec<u8>,
}

impl Datagram {
    /// Packs `messages` into a datagram for `address`.
    ///
    /// The datagram is reliable when any message is. Unreliable datagrams get no
    /// retry budget.
    pub fn pack(
        address: SocketAddr,
        sequence: u32,
        messages: Vec<Message>,
        max_retries: u8,
        now: Instant,
    ) -> Result<Self> {
        let reliable = messages.iter().any(Message::is_reliable);
        Self::build(address, sequence, &messages, reliable, max_retries, now)
    }

    /// Packs a lone multipart fragment. Fragments always travel reliably.
    pub fn pack_fragment(
        address: SocketAddr,
        sequence: u32,
        fragment: Message,
        max_retries: u8,
        now: Instant,
    ) -> Result<Self> {
        Self::build(address, sequence, std::slice::from_ref(&fragment), true, max_retries, now)
    }

    fn build(
        address: SocketAddr,
        sequence: u32,
        messages: &[Message],
        reliable: bool,
        max_retries: u8,
        now: Instant,
    ) -> Result<Self> {
        let mut body = Vec::with_capacity(messages.iter().map(Message::wire_size).sum());
        for message in messages {
            write_block(&mut body, message.kind(), message.payload())?;
        }
        Ok(Self {
            address,
            sequence,
            reliable,
            is_ack: false,
            retries_remaining: if reliable { max_retries } else { 0 },
            last_send_time: now,
            body,
        })
    }

    /// Builds the empty acknowledgement for this datagram.
    pub fn ack(&self, now: Instant) -> Self {
        Self {
            address: self.address,
            sequence: self.sequence,
            reliable: false,
            is_ack: true,
            retries_remaining: 0,
            last_send_time: now,
            body: Vec::new(),
        }
    }

    /// Spends one retry and refreshes the send time.
    ///
    /// Returns false once the budget is gone; the caller then gives up on the datagram.
    pub fn retry(&mut self, now: Instant) -> bool {
        if self.is_ack || self.retries_remaining == 0 {
            return false;
        }
        self.retries_remaining -= 1;
        self.last_send_time = now;
        true
    }

    /// Whether `interval` has passed since the last transmission.
    pub fn is_due(&self, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(self.last_send_time) >= interval
    }

    /// Appends the wire form of the datagram to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        let mut flags = 0;
        if self.reliable {
            flags |= FLAG_RELIABLE;
        }
        if self.is_ack {
            flags |= FLAG_ACK;
        }
        buf.write_u32::<BigEndian>(self.sequence)?;
        buf.write_u8(flags)?;
        buf.write_all(&self.body)?;
        Ok(())
    }

    /// Parses a received UDP payload.
    ///
    /// Only the header is checked here; block errors surface while iterating `blocks`.
    /// An ack is never reliable, whatever its flags claim.
    pub fn decode(address: SocketAddr, bytes: &[u8], now: Instant) -> Result<Self> {
        if bytes.len() < DATAGRAM_HEADER_SIZE {
            return Err(ErrorKind::MalformedDatagram(format!(
                "{} bytes from {} is shorter than the datagram header",
                bytes.len(),
                address
            )));
        }
        let mut cursor = Cursor::new(bytes);
        let sequence = cursor.read_u32::<BigEndian>()?;
        let flags = cursor.read_u8()?;
        let is_ack = flags & FLAG_ACK != 0;
        Ok(Self {
            address,
            sequence,
            reliable: flags & FLAG_RELIABLE != 0 && !is_ack,
            is_ack,
            retries_remaining: 0,
            last_send_time: now,
            body: bytes[DATAGRAM_HEADER_SIZE..].to_vec(),
        })
    }

    /// Iterates the blocks of the body.
    pub fn blocks(&self) -> BlockReader<'_> {
        BlockReader::new(&self.body)
    }

    /// Remote endpoint.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Sequence number, per peer.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Whether the receiver must acknowledge this datagram.
    pub fn is_reliable(&self) -> bool {
        self.reliable
    }

    /// Whether this datagram is itself an acknowledgement.
    pub fn is_ack(&self) -> bool {
        self.is_ack
    }

    /// Retries left before the datagram is abandoned.
    pub fn retries_remaining(&self) -> u8 {
        self.retries_remaining
    }

    /// Time of the most recent transmission.
    pub fn last_send_time(&self) -> Instant {
        self.last_send_time
    }

    /// Encoded block bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Size on the wire, header included.
    pub fn wire_len(&self) -> usize {
        DATAGRAM_HEADER_SIZE + self.body.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageFlags;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn msg(kind: u8, len: usize, flags: MessageFlags) -> Message {
        Message::new(1, kind, vec![kind; len], flags)
    }

    #[test]
    fn test_pack_marks_reliable_if_any_message_is() {
        let now = Instant::now();
        let gram = Datagram::pack(
            addr(),
            7,
            vec![msg(1, 4, MessageFlags::UNRELIABLE), msg(2, 4, MessageFlags::RELIABLE)],
            5,
            now,
        )
        .unwrap();
        assert!(gram.is_reliable());
        assert_eq!(gram.retries_remaining(), 5);
        assert_eq!(gram.wire_len(), 5 + 6 + 6);

        let plain = Datagram::pack(addr(), 8, vec![msg(1, 4, MessageFlags::UNRELIABLE)], 5, now).unwrap();
        assert!(!plain.is_reliable());
        assert_eq!(plain.retries_remaining(), 0);
    }

    #[test]
    fn test_fragment_is_always_reliable() {
        let fragment = Message::new(1, gramlink_core::constants::MULTIPART_TYPE, vec![0; 20], MessageFlags::UNRELIABLE);
        let gram = Datagram::pack_fragment(addr(), 3, fragment, 4, Instant::now()).unwrap();
        assert!(gram.is_reliable());
        assert_eq!(gram.retries_remaining(), 4);
    }

    #[test]
    fn test_header_layout() {
        let gram = Datagram::pack(addr(), 0x0102_0304, vec![msg(9, 1, MessageFlags::RELIABLE)], 5, Instant::now())
            .unwrap();
        let mut wire = Vec::new();
        gram.encode(&mut wire).unwrap();
        assert_eq!(wire, vec![1, 2, 3, 4, FLAG_RELIABLE, 9, 1, 9]);
    }

    #[test]
    fn test_decode_restores_blocks() {
        let now = Instant::now();
        let gram = Datagram::pack(
            addr(),
            42,
            vec![msg(3, 10, MessageFlags::RELIABLE), msg(4, 0, MessageFlags::RELIABLE)],
            5,
            now,
        )
        .unwrap();
        let mut wire = Vec::new();
        gram.encode(&mut wire).unwrap();

        let decoded = Datagram::decode(addr(), &wire, now).unwrap();
        assert_eq!(decoded.sequence(), 42);
        assert!(decoded.is_reliable());
        assert!(!decoded.is_ack());
        let kinds: Vec<u8> = decoded.blocks().map(|b| b.unwrap().kind).collect();
        assert_eq!(kinds, vec![3, 4]);
    }

    #[test]
    fn test_ack_echoes_sequence_without_payload() {
        let now = Instant::now();
        let gram = Datagram::pack(addr(), 99, vec![msg(3, 10, MessageFlags::RELIABLE)], 5, now).unwrap();
        let ack = gram.ack(now);
        assert_eq!(ack.sequence(), 99);
        assert!(ack.is_ack());
        assert!(!ack.is_reliable());
        assert!(ack.body().is_empty());

        let mut wire = Vec::new();
        ack.encode(&mut wire).unwrap();
        assert_eq!(wire, vec![0, 0, 0, 99, FLAG_ACK]);
    }

    #[test]
    fn test_ack_flag_overrides_reliable_bit() {
        let decoded = Datagram::decode(addr(), &[0, 0, 0, 1, FLAG_ACK | FLAG_RELIABLE], Instant::now()).unwrap();
        assert!(decoded.is_ack());
        assert!(!decoded.is_reliable());
    }

    #[test]
    fn test_retry_spends_budget() {
        let start = Instant::now();
        let mut gram = Datagram::pack(addr(), 1, vec![msg(3, 1, MessageFlags::RELIABLE)], 2, start).unwrap();
        let later = start + Duration::from_millis(400);

        assert!(gram.is_due(later, Duration::from_millis(300)));
        assert!(gram.retry(later));
        assert_eq!(gram.last_send_time(), later);
        assert!(!gram.is_due(later, Duration::from_millis(300)));
        assert!(gram.retry(later));
        assert!(!gram.retry(later));
        assert_eq!(gram.retries_remaining(), 0);

        assert!(!gram.ack(later).retry(later));
    }

    #[test]
    fn test_decode_rejects_short_header() {
        assert!(matches!(
            Datagram::decode(addr(), &[0, 0, 1], Instant::now()),
            Err(ErrorKind::MalformedDatagram(_))
        ));
    }
}
