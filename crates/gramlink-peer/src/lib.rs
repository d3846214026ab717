#![warn(missing_docs)]

//! gramlink-peer: per-remote-endpoint state.
//!
//! A `Peer` owns everything the link knows about one endpoint: outbound queues,
//! the sorted inbound queue, multipart reassembly, the send-rate history and the
//! overflow status collaborators poll.

/// Recently accepted reliable sequences.
pub mod duplicate_filter;
/// Bounded multipart reassembly.
pub mod multipart_assembly;
mod peer;
mod peer_status;
/// Rate limiting over the last few sends.
pub mod send_history;
/// Per-peer counters.
pub mod statistics;

pub use peer::{GramReceipt, Peer};
pub use peer_status::PeerStatus;
pub use statistics::PeerStatistics;
