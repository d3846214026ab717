#![warn(missing_docs)]

//! gramlink-core: foundational types shared by every gramlink layer.
//!
//! This crate holds the pieces that the wire, peer and host layers all agree on:
//! - Link configuration (`LinkConfig`, `PeerLimits`)
//! - Error handling (`ErrorKind`, `Result`)
//! - Wire constants
//! - The pluggable I/O seams (`transport::Socket`, `interceptor::Interceptor`)

/// Identifier the Link hands out for each remote endpoint.
pub type PeerId = u32;

/// Wire constants shared across layers.
pub mod constants {
    /// Size of the datagram header: sequence (u32) + flags (u8).
    pub const DATAGRAM_HEADER_SIZE: usize = 5;
    /// Size of a block header: type (u8) + size (u8).
    pub const BLOCK_HEADER_SIZE: usize = 2;
    /// Largest payload a single block can describe.
    pub const MAX_BLOCK_PAYLOAD: usize = u8::MAX as usize;
    /// Size of the sub-header carried at the front of every multipart fragment block.
    pub const MULTIPART_HEADER_SIZE: usize = 16;
    /// UDP/IP overhead added to every datagram for bandwidth accounting.
    pub const UDP_OVERHEAD: usize = 34;
    /// Whole-datagram budget, header included.
    pub const MAX_DATAGRAM_SIZE: usize = 512;
    /// Payload bytes carried by one multipart fragment.
    pub const DEFAULT_CHUNK_SIZE: usize = 232;
    /// Number of sends remembered by the rate limiter.
    pub const SEND_HISTORY_LEN: usize = 8;
    /// Number of multipart streams a peer reassembles concurrently.
    pub const DEFAULT_MULTIPART_SLOTS: usize = 8;

    /// Datagram flag: the sender expects an ack.
    pub const FLAG_RELIABLE: u8 = 0b0000_0001;
    /// Datagram flag: this datagram acknowledges the echoed sequence.
    pub const FLAG_ACK: u8 = 0b0000_0010;

    /// Block type that terminates a datagram body early.
    pub const TERMINATOR_TYPE: u8 = 0;
    /// First message type reserved for link-internal use.
    pub const RESERVED_TYPE_THRESHOLD: u8 = 0xF0;
    /// Block type of a multipart fragment.
    pub const MULTIPART_TYPE: u8 = 0xFE;
}

/// Configuration options for the link and its peers.
pub mod config;
/// Error types and results.
pub mod error;
/// Packet interception for custom processing.
pub mod interceptor;
/// Transport abstraction for pluggable I/O.
pub mod transport;
