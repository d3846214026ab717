/// Backpressure status of a peer.
///
/// Set when a queue cap rejects traffic and left set until a collaborator clears it,
/// so a burst of drops between two polls is not missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerStatus {
    /// No queue has overflowed since the last reset.
    #[default]
    Ok,

    /// An outbound message was dropped because the send queues were full.
    SendOverflow,

    /// An inbound datagram was discarded because the receive side was full.
    RecvOverflow,
}

impl PeerStatus {
    /// Returns true if nothing overflowed since the last reset
    pub fn is_ok(&self) -> bool {
        matches!(self, PeerStatus::Ok)
    }

    /// Returns true if either queue overflowed
    pub fn is_overflow(&self) -> bool {
        matches!(self, PeerStatus::SendOverflow | PeerStatus::RecvOverflow)
    }
}
