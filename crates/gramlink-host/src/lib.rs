#![warn(missing_docs)]

//! gramlink-host: the `Link`, which owns the UDP socket, the peer table and the
//! background I/O loop.

/// Link-wide traffic counters.
pub mod counters;
/// One iteration of link I/O, driven by the background thread or by hand.
pub mod driver;
/// The public `Link` handle.
pub mod link;
/// Reliable datagrams awaiting acknowledgement and the lag estimate.
pub mod pending_acks;
/// Peer registry keyed by id and address.
pub mod peer_table;
/// UDP socket setup.
pub mod socket;
/// Time utilities for the host.
pub mod time;

pub use counters::{CounterSnapshot, LinkCounters};
pub use driver::LinkDriver;
pub use link::Link;
pub use peer_table::{PeerTable, SharedPeer};
pub use pending_acks::{PendingAcks, RetryBatch};
pub use socket::UdpTransport;
pub use time::{Clock, SystemClock};
