//! Raw datagram interception.
//!
//! The link itself neither encrypts nor authenticates. An `Interceptor` sees every UDP
//! payload right after it leaves the socket and right before it enters it, so a
//! separate security layer (or a packet capture tool) can live here without the
//! transport knowing about it.

use std::net::SocketAddr;

/// Hook that can rewrite or discard raw datagrams.
///
/// # Examples
/// ```
/// use std::net::SocketAddr;
/// use gramlink_core::interceptor::Interceptor;
///
/// /// Drops everything from one noisy host.
/// struct Blocklist(SocketAddr);
///
/// impl Interceptor for Blocklist {
///     fn on_receive(&mut self, addr: &SocketAddr, _data: &mut [u8]) -> bool {
///         *addr != self.0
///     }
///
///     fn on_send(&mut self, _addr: &SocketAddr, _data: &mut Vec<u8>) -> bool {
///         true
///     }
/// }
/// ```
pub trait Interceptor: Send {
    /// Called for every datagram read from the socket, before it is decoded.
    ///
    /// Returning `false` discards the datagram: it is not decoded, acknowledged or
    /// counted against the peer.
    fn on_receive(&mut self, addr: &SocketAddr, data: &mut [u8]) -> bool;

    /// Called for every encoded datagram, right before the socket write.
    ///
    /// `data` may be resized. Returning `false` discards it; a reliable datagram
    /// discarded here is still retried by the link.
    fn on_send(&mut self, addr: &SocketAddr, data: &mut Vec<u8>) -> bool;
}

/// Interceptor that passes every datagram through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpInterceptor;

impl Interceptor for NoOpInterceptor {
    fn on_receive(&mut self, _addr: &SocketAddr, _data: &mut [u8]) -> bool {
        true
    }

    fn on_send(&mut self, _addr: &SocketAddr, _data: &mut Vec<u8>) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DATAGRAM_HEADER_SIZE;

    fn addr() -> SocketAddr {
        "10.0.0.2:4000".parse().unwrap()
    }

    /// Keystream cipher standing in for a real security layer.
    struct KeystreamCipher {
        key: [u8; 4],
    }

    impl KeystreamCipher {
        fn apply(&self, data: &mut [u8]) {
            for (i, byte) in data.iter_mut().enumerate() {
                *byte ^= self.key[i % self.key.len()];
            }
        }
    }

    impl Interceptor for KeystreamCipher {
        fn on_receive(&mut self, _addr: &SocketAddr, data: &mut [u8]) -> bool {
            self.apply(data);
            true
        }

        fn on_send(&mut self, _addr: &SocketAddr, data: &mut Vec<u8>) -> bool {
            self.apply(data);
            true
        }
    }

    #[test]
    fn test_cipher_round_trips_datagram() {
        let mut cipher = KeystreamCipher { key: [0x13, 0x37, 0xC0, 0xDE] };
        let original = vec![0, 0, 0, 9, 1, 0x10, 3, b'a', b'b', b'c'];
        let mut wire = original.clone();

        assert!(cipher.on_send(&addr(), &mut wire));
        assert_ne!(wire, original);
        assert!(cipher.on_receive(&addr(), &mut wire));
        assert_eq!(wire, original);
    }

    /// Rejects anything too short to carry a datagram header.
    struct RuntFilter {
        dropped: usize,
    }

    impl Interceptor for RuntFilter {
        fn on_receive(&mut self, _addr: &SocketAddr, data: &mut [u8]) -> bool {
            let keep = data.len() >= DATAGRAM_HEADER_SIZE;
            if !keep {
                self.dropped += 1;
            }
            keep
        }

        fn on_send(&mut self, _addr: &SocketAddr, _data: &mut Vec<u8>) -> bool {
            true
        }
    }

    #[test]
    fn test_filter_drops_runts() {
        let mut filter = RuntFilter { dropped: 0 };
        assert!(!filter.on_receive(&addr(), &mut [1, 2, 3]));
        assert!(filter.on_receive(&addr(), &mut [0, 0, 0, 1, 0]));
        assert_eq!(filter.dropped, 1);
    }

    #[test]
    fn test_noop_leaves_bytes_alone() {
        let mut noop = NoOpInterceptor;
        let mut data = vec![0, 0, 0, 1, 1, 7, 0];
        let before = data.clone();
        assert!(noop.on_send(&addr(), &mut data));
        assert!(noop.on_receive(&addr(), &mut data));
        assert_eq!(data, before);
    }
}
