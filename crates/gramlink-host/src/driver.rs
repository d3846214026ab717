use std::{fmt, io, net::SocketAddr, sync::Arc, time::Instant};

use gramlink_core::{
    interceptor::{Interceptor, NoOpInterceptor},
    transport::Socket,
};
use gramlink_peer::GramReceipt;
use gramlink_protocol::Datagram;
use tracing::{debug, error, info, trace};

use crate::{link::LinkShared, pending_acks::PendingAcks};

/// Large enough for any UDP payload, so oversized datagrams are seen whole and rejected.
const RECEIVE_BUFFER_SIZE: usize = 65_536;

/// What happened to one socket write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendOutcome {
    Sent,
    /// The interceptor discarded the datagram.
    Intercepted,
    /// The socket has no room right now; stop writing this iteration.
    WouldBlock,
    Failed,
}

/// One iteration of link I/O over a `Socket`.
///
/// `Link` runs this on its background thread. It can also be driven by hand with
/// explicit timestamps, which is how the deterministic tests use it.
pub struct LinkDriver<S: Socket> {
    socket: S,
    interceptor: Box<dyn Interceptor>,
    shared: Arc<LinkShared>,
    pending: PendingAcks,
    receive_buffer: Vec<u8>,
    send_buffer: Vec<u8>,
}

impl<S: Socket> fmt::Debug for LinkDriver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkDriver")
            .field("socket", &"<socket>")
            .field("interceptor", &"<interceptor>")
            .field("pending", &self.pending)
            .finish()
    }
}

impl<S: Socket> LinkDriver<S> {
    pub(crate) fn new(socket: S, shared: Arc<LinkShared>, interceptor: Option<Box<dyn Interceptor>>) -> Self {
        let config = shared.config();
        Self {
            pending: PendingAcks::new(config.min_resend_interval),
            receive_buffer: vec![0; RECEIVE_BUFFER_SIZE],
            send_buffer: Vec::with_capacity(config.max_datagram_size),
            interceptor: interceptor.unwrap_or_else(|| Box::new(NoOpInterceptor)),
            socket,
            shared,
        }
    }

    /// Reads, acknowledges, retries, sends and sweeps once.
    pub fn poll(&mut self, now: Instant) {
        self.read_datagrams(now);
        self.send_datagrams(now);
        self.sweep_idle_peers(now);
    }

    /// Reliable datagrams still awaiting an ack.
    pub fn pending_acks(&self) -> &PendingAcks {
        &self.pending
    }

    fn read_datagrams(&mut self, now: Instant) {
        loop {
            match self.socket.receive_packet(self.receive_buffer.as_mut()) {
                Ok((payload, address)) => {
                    let len = payload.len();
                    if self.interceptor.on_receive(&address, &mut self.receive_buffer[..len]) {
                        self.handle_datagram(address, len, now);
                    }
                }
                Err(e) => {
                    if e.kind() != io::ErrorKind::WouldBlock {
                        error!("Encountered an error receiving data: {:?}", e);
                    }
                    break;
                }
            }
            if self.socket.is_blocking_mode() {
                break;
            }
        }
    }

    fn handle_datagram(&mut self, address: SocketAddr, len: usize, now: Instant) {
        let counters = self.shared.counters();
        counters.record_recv(len);

        let gram = match Datagram::decode(address, &self.receive_buffer[..len], now) {
            Ok(gram) => gram,
            Err(err) => {
                counters.record_malformed();
                debug!("Dropping datagram from {}: {}", address, err);
                return;
            }
        };

        if gram.is_ack() {
            if let Some(rtt) = self.pending.process_ack(&gram, now) {
                counters.set_lag_ms(self.pending.lag_ms());
                trace!("Ack {} from {} after {:?}", gram.sequence(), address, rtt);
            }
            if let Some(peer) = self.shared.state().peers.by_address(&address) {
                peer.lock().touch(now);
            }
            return;
        }

        let acknowledge = {
            let config = self.shared.config();
            let mut state = self.shared.state();
            let (peer_id, peer) = state.peers.get_or_create(address, config, now);
            let mut peer = peer.lock();
            match peer.receive_gram(&gram, now) {
                Ok(receipt) => {
                    if let GramReceipt::Accepted { delivered, malformed } = receipt {
                        state.receive_order.extend(std::iter::repeat(peer_id).take(delivered));
                        if malformed {
                            counters.record_malformed();
                        }
                    }
                    gram.is_reliable() && receipt.should_ack()
                }
                Err(err) => {
                    debug!("Refused datagram {} from peer {}: {}", gram.sequence(), peer_id, err);
                    false
                }
            }
        };

        if acknowledge {
            let ack = gram.ack(now);
            self.transmit(&ack);
        }
    }

    fn send_datagrams(&mut self, now: Instant) {
        if !self.do_retries(now) {
            return;
        }

        let peers = self.shared.state().peers.snapshot();
        for (peer_id, peer) in peers {
            loop {
                let gram = {
                    let mut peer = peer.lock();
                    if !peer.has_outbound() || !peer.ok_to_send(now) {
                        break;
                    }
                    match peer.compose_gram(now) {
                        Some(gram) => {
                            peer.record_send(now, gram.wire_len());
                            gram
                        }
                        None => break,
                    }
                };

                let outcome = self.transmit(&gram);
                if gram.is_reliable() {
                    self.pending.track(gram);
                } else if outcome == SendOutcome::WouldBlock || outcome == SendOutcome::Failed {
                    self.shared.counters().record_drops(1);
                }
                if outcome == SendOutcome::WouldBlock {
                    trace!("Socket full while sending to peer {}", peer_id);
                    return;
                }
            }
        }
    }

    /// Resends overdue reliable datagrams. Returns false if the socket filled up.
    ///
    /// A retry is only spent on datagrams the socket took; the rest stay due.
    fn do_retries(&mut self, now: Instant) -> bool {
        let batch = self.pending.collect_due(now);
        let shared = Arc::clone(&self.shared);
        let counters = shared.counters();
        if !batch.exhausted.is_empty() {
            counters.record_drops(batch.exhausted.len());
        }
        for gram in &batch.resend {
            if self.transmit(gram) == SendOutcome::WouldBlock {
                return false;
            }
            if self.pending.mark_resent(gram.address(), gram.sequence(), now) {
                counters.record_retry();
            }
        }
        true
    }

    fn sweep_idle_peers(&mut self, now: Instant) {
        let timeout = self.shared.config().disconnect_timeout;
        let mut state = self.shared.state();
        for peer_id in state.peers.idle(now, timeout) {
            if let Some(peer) = state.peers.remove(peer_id) {
                let address = peer.lock().address();
                state.receive_order.retain(|ticket| *ticket != peer_id);
                let abandoned = self.pending.purge(address);
                info!(
                    "Evicted peer {} ({}) after {:?} of silence, {} unacked datagram(s) discarded",
                    peer_id, address, timeout, abandoned
                );
            }
        }
    }

    fn transmit(&mut self, gram: &Datagram) -> SendOutcome {
        let address = gram.address();
        self.send_buffer.clear();
        if let Err(err) = gram.encode(&mut self.send_buffer) {
            error!("Failed to encode datagram {} for {}: {}", gram.sequence(), address, err);
            return SendOutcome::Failed;
        }
        if !self.interceptor.on_send(&address, &mut self.send_buffer) {
            return SendOutcome::Intercepted;
        }

        match self.socket.send_packet(&address, &self.send_buffer) {
            Ok(_) => {
                self.shared.counters().record_sent(self.send_buffer.len());
                SendOutcome::Sent
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => SendOutcome::WouldBlock,
            Err(e) => {
                error!("Error occured sending a packet (to {}): {}", address, e);
                SendOutcome::Failed
            }
        }
    }
}
