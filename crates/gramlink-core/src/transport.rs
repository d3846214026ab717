//! Transport abstraction for pluggable I/O.

use std::{io::Result, net::SocketAddr};

/// Low-level datagram socket the link driver reads from and writes to.
///
/// The UDP socket is the production implementation. Tests plug in in-memory
/// pairs so that loss and reordering are deterministic.
pub trait Socket {
    /// Sends one datagram to `addr`.
    ///
    /// A non-blocking socket that cannot take the datagram right now returns
    /// `std::io::ErrorKind::WouldBlock`.
    fn send_packet(&mut self, addr: &SocketAddr, payload: &[u8]) -> Result<usize>;

    /// Receives one datagram into `buffer`.
    ///
    /// Returns `std::io::ErrorKind::WouldBlock` once nothing is pending.
    fn receive_packet<'a>(&mut self, buffer: &'a mut [u8]) -> Result<(&'a [u8], SocketAddr)>;

    /// Returns the socket address that this socket was created from.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Returns whether socket operates in blocking or non-blocking mode.
    fn is_blocking_mode(&self) -> bool;
}
