#![warn(missing_docs)]

//! Gramlink: reliable, fragmenting message transport over a single UDP socket.
//!
//! This crate re-exports the surface most applications need:
//!
//! - The link and its counters (`Link`, `CounterSnapshot`)
//! - Messages and their delivery flags (`Message`, `MessageFlags`)
//! - Configuration and per-peer throttles (`LinkConfig`, `PeerLimits`)
//! - Peer observation (`PeerStatus`, `PeerStatistics`)
//!
//! Example
//! ```no_run
//! use gramlink::prelude::*;
//!
//! let link = Link::bind_any().unwrap();
//! let peer = link.add_peer("127.0.0.1:9000".parse().unwrap());
//!
//! // Large payloads are split and reassembled transparently.
//! link.send_message(peer, 1, vec![0u8; 10_000], MessageFlags::RELIABLE.with_scatter());
//!
//! while let Some(message) = link.get_message(None) {
//!     println!("{} bytes of type {} from peer {}", message.payload().len(), message.kind(), message.peer_id());
//! }
//! ```

// Core config, errors and extension points
pub use gramlink_core::{
    config::{LinkConfig, PeerLimits},
    error::{ErrorKind, Result},
    interceptor::Interceptor,
    transport::Socket,
    PeerId,
};
// Host: the link and its driver
pub use gramlink_host::{Clock, CounterSnapshot, Link, LinkDriver, SystemClock};
// Peer observation
pub use gramlink_peer::{PeerStatistics, PeerStatus};
// Protocol: messages and flags
pub use gramlink_protocol::{Message, MessageFlags};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        CounterSnapshot, ErrorKind, Link, LinkConfig, Message, MessageFlags, PeerId, PeerLimits,
        PeerStatistics, PeerStatus,
    };
}
