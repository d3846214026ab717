//! Error taxonomy for the transport.
//!
//! None of these ever escape the public `Link` API as a panic. They travel between the
//! crates as `Result`s and are folded into counters and per-peer status flags at the top.

use std::io;

use thiserror::Error;

use crate::PeerId;

/// Everything that can go wrong inside the transport.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Enqueuing would push a peer's outbound queues past `max_queue_bytes`.
    #[error("send queue would exceed its byte cap")]
    SendOverflow,
    /// Accepting a datagram would push a peer's inbound queue past `max_queue_bytes`.
    #[error("receive queue would exceed its byte cap")]
    RecvOverflow,
    /// No peer is registered under this id.
    #[error("peer {0} is unknown")]
    UnreachablePeer(PeerId),
    /// A reliable datagram used its whole retry budget without being acknowledged.
    #[error("reliable datagram {0} exhausted its retries")]
    RetryExhausted(u32),
    /// Header or block parsing found inconsistent data.
    #[error("malformed datagram: {0}")]
    MalformedDatagram(String),
    /// Payload needs more fragments than the multipart header can number.
    #[error("message of {0} bytes is too large to fragment")]
    MessageTooLarge(usize),
    /// Collaborators may not send the terminator or link-internal types.
    #[error("message type {0:#04x} is reserved")]
    ReservedMessageType(u8),
    /// Configuration rejected by `LinkConfig::validate`.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Socket level failure.
    #[error(transparent)]
    IoError(#[from] io::Error),
}

impl ErrorKind {
    /// Returns true for the lossy backpressure errors a peer records as its status.
    pub fn is_overflow(&self) -> bool {
        matches!(self, ErrorKind::SendOverflow | ErrorKind::RecvOverflow)
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ErrorKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(ErrorKind::UnreachablePeer(7).to_string(), "peer 7 is unknown");
        assert_eq!(ErrorKind::ReservedMessageType(0xFE).to_string(), "message type 0xfe is reserved");
        assert_eq!(
            ErrorKind::RetryExhausted(42).to_string(),
            "reliable datagram 42 exhausted its retries"
        );
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> Result<()> {
            Err(io::Error::new(io::ErrorKind::AddrInUse, "taken"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(ErrorKind::IoError(_))));
    }

    #[test]
    fn test_overflow_classification() {
        assert!(ErrorKind::SendOverflow.is_overflow());
        assert!(ErrorKind::RecvOverflow.is_overflow());
        assert!(!ErrorKind::MalformedDatagram("short".into()).is_overflow());
    }
}
