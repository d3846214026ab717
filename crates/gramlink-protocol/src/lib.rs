#![warn(missing_docs)]

//! gramlink-protocol: the wire format.
//!
//! A UDP payload is one `Datagram`: a big-endian sequence number, a flags byte and a
//! body of `{type, size, payload}` blocks. Each block carries one `Message`; messages
//! too large for a block travel as multipart fragments whose payload starts with a
//! `MultipartHeader`.

/// Block framing inside a datagram body.
pub mod block;
/// Datagram envelope: packing, acks, retries and the header codec.
pub mod datagram;
/// Application-level messages and their flags.
pub mod message;
/// Multipart fragment sub-header.
pub mod multipart;

pub use block::{Block, BlockReader};
pub use datagram::Datagram;
pub use message::{validate_message_type, Message, MessageFlags};
pub use multipart::MultipartHeader;
