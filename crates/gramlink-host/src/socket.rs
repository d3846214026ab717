use std::{
    io,
    net::{SocketAddr, UdpSocket},
};

use gramlink_core::{config::LinkConfig, error::Result, transport::Socket};
use socket2::Socket as Socket2;

/// Applies the socket buffer sizes from configuration.
fn apply_socket_options(socket: &UdpSocket, config: &LinkConfig) -> io::Result<()> {
    if config.socket_recv_buffer_size.is_none() && config.socket_send_buffer_size.is_none() {
        return Ok(());
    }
    let socket2 = Socket2::from(socket.try_clone()?);

    if let Some(size) = config.socket_recv_buffer_size {
        socket2.set_recv_buffer_size(size)?;
    }
    if let Some(size) = config.socket_send_buffer_size {
        socket2.set_send_buffer_size(size)?;
    }
    Ok(())
}

/// Non-blocking UDP socket owned by the link's I/O thread.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Wraps a bound socket, applying `config` options and switching it to non-blocking.
    pub fn new(socket: UdpSocket, config: &LinkConfig) -> Result<Self> {
        apply_socket_options(&socket, config)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }
}

impl Socket for UdpTransport {
    fn send_packet(&mut self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
        self.socket.send_to(payload, addr)
    }

    fn receive_packet<'a>(&mut self, buffer: &'a mut [u8]) -> io::Result<(&'a [u8], SocketAddr)> {
        self.socket.recv_from(buffer).map(move |(len, address)| (&buffer[..len], address))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn is_blocking_mode(&self) -> bool {
        false
    }
}
