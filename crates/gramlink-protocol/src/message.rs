use gramlink_core::{
    constants::{BLOCK_HEADER_SIZE, MULTIPART_TYPE, RESERVED_TYPE_THRESHOLD, TERMINATOR_TYPE},
    error::{ErrorKind, Result},
    PeerId,
};

const RELIABLE_BIT: u8 = 0b001;
const PRIORITY_BIT: u8 = 0b010;
const SCATTER_BIT: u8 = 0b100;

/// Delivery flags attached to a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MessageFlags {
    /// Resend until acknowledged or out of retries.
    pub reliable: bool,
    /// Jump ahead of non-priority messages in the send queue.
    pub priority: bool,
    /// When fragmented, fragments may trickle out one per datagram instead of
    /// being packed with regular traffic.
    pub scatter: bool,
}

impl MessageFlags {
    /// Fire-and-forget delivery.
    pub const UNRELIABLE: MessageFlags = MessageFlags { reliable: false, priority: false, scatter: false };
    /// Acknowledged delivery.
    pub const RELIABLE: MessageFlags = MessageFlags { reliable: true, priority: false, scatter: false };

    /// Returns these flags with `priority` set.
    pub fn with_priority(mut self) -> Self {
        self.priority = true;
        self
    }

    /// Returns these flags with `scatter` set.
    pub fn with_scatter(mut self) -> Self {
        self.scatter = true;
        self
    }

    /// Packs the flags into the byte carried by multipart sub-headers.
    pub fn to_bits(self) -> u8 {
        let mut bits = 0;
        if self.reliable {
            bits |= RELIABLE_BIT;
        }
        if self.priority {
            bits |= PRIORITY_BIT;
        }
        if self.scatter {
            bits |= SCATTER_BIT;
        }
        bits
    }

    /// Inverse of `to_bits`. Unknown bits are ignored.
    pub fn from_bits(bits: u8) -> Self {
        Self {
            reliable: bits & RELIABLE_BIT != 0,
            priority: bits & PRIORITY_BIT != 0,
            scatter: bits & SCATTER_BIT != 0,
        }
    }
}

/// One logical unit of application data.
///
/// A message has exactly one owner at a time: the collaborator that built it, a peer
/// queue, or the datagram it was packed into. It is moved, never shared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    peer_id: PeerId,
    kind: u8,
    flags: MessageFlags,
    sequence: u32,
    payload: Vec<u8>,
}

impl Message {
    /// Creates an outbound message for `peer_id`.
    pub fn new(peer_id: PeerId, kind: u8, payload: impl Into<Vec<u8>>, flags: MessageFlags) -> Self {
        Self { peer_id, kind, flags, sequence: 0, payload: payload.into() }
    }

    /// Creates an inbound message stamped with the sequence of the datagram that carried it.
    pub fn received(
        peer_id: PeerId,
        kind: u8,
        payload: impl Into<Vec<u8>>,
        flags: MessageFlags,
        sequence: u32,
    ) -> Self {
        Self { peer_id, kind, flags, sequence, payload: payload.into() }
    }

    /// Peer this message is addressed to or came from.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Application type byte.
    pub fn kind(&self) -> u8 {
        self.kind
    }

    /// Delivery flags.
    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    /// Whether the message must be acknowledged.
    ///
    /// On a received message this is the reliability of the datagram that carried it.
    pub fn is_reliable(&self) -> bool {
        self.flags.reliable
    }

    /// Whether the message jumps the send queue.
    pub fn is_priority(&self) -> bool {
        self.flags.priority
    }

    /// Whether fragments of this message may be scattered across datagrams.
    pub fn is_scatter(&self) -> bool {
        self.flags.scatter
    }

    /// Whether this is a link-internal multipart fragment.
    pub fn is_multipart(&self) -> bool {
        self.kind == MULTIPART_TYPE
    }

    /// Datagram sequence this message arrived in. Zero for outbound messages.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the message and returns its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Bytes this message occupies inside a datagram body.
    pub fn wire_size(&self) -> usize {
        BLOCK_HEADER_SIZE + self.payload.len()
    }
}

/// Rejects the terminator type and the link-internal range.
pub fn validate_message_type(kind: u8) -> Result<()> {
    if kind == TERMINATOR_TYPE || kind >= RESERVED_TYPE_THRESHOLD {
        return Err(ErrorKind::ReservedMessageType(kind));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_types_rejected() {
        assert!(validate_message_type(0).is_err());
        assert!(validate_message_type(RESERVED_TYPE_THRESHOLD).is_err());
        assert!(validate_message_type(MULTIPART_TYPE).is_err());
        assert!(validate_message_type(0xFF).is_err());
        assert!(validate_message_type(1).is_ok());
        assert!(validate_message_type(RESERVED_TYPE_THRESHOLD - 1).is_ok());
    }

    #[test]
    fn test_flag_bits() {
        let flags = MessageFlags::RELIABLE.with_scatter();
        assert_eq!(flags.to_bits(), 0b101);
        assert_eq!(MessageFlags::from_bits(0b101), flags);
        assert_eq!(MessageFlags::from_bits(0b1111_1000), MessageFlags::UNRELIABLE);
    }

    #[test]
    fn test_wire_size_includes_block_header() {
        let msg = Message::new(3, 10, vec![0u8; 50], MessageFlags::UNRELIABLE);
        assert_eq!(msg.wire_size(), 52);
        assert_eq!(msg.sequence(), 0);
        assert!(!msg.is_multipart());
        assert_eq!(msg.into_payload().len(), 50);
    }
}
