use std::{
    collections::VecDeque,
    fmt,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use gramlink_core::{
    config::{LinkConfig, PeerLimits},
    error::{ErrorKind, Result},
    interceptor::Interceptor,
    transport::Socket,
    PeerId,
};
use gramlink_peer::{PeerStatistics, PeerStatus};
use gramlink_protocol::{validate_message_type, Message, MessageFlags};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::{
    counters::{CounterSnapshot, LinkCounters},
    driver::LinkDriver,
    peer_table::PeerTable,
    socket::UdpTransport,
    time::{Clock, SystemClock},
};

/// Everything guarded by the link-wide lock.
///
/// Lock order is this state first, then an individual peer.
#[derive(Debug)]
pub(crate) struct LinkState {
    pub(crate) peers: PeerTable,
    /// One ticket per deliverable message, in arrival order across peers.
    pub(crate) receive_order: VecDeque<PeerId>,
}

impl LinkState {
    fn new(peer_id_base: PeerId) -> Self {
        Self { peers: PeerTable::new(peer_id_base), receive_order: VecDeque::new() }
    }
}

/// State shared by the `Link` handle and its I/O thread.
pub(crate) struct LinkShared {
    config: LinkConfig,
    state: Mutex<LinkState>,
    counters: LinkCounters,
    shutdown: AtomicBool,
    clock: Arc<dyn Clock>,
    local_addr: SocketAddr,
}

impl LinkShared {
    pub(crate) fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock()
    }

    pub(crate) fn counters(&self) -> &LinkCounters {
        &self.counters
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Wakeups for the I/O thread.
#[derive(Debug, Clone, Copy)]
enum Signal {
    /// New outbound data; compose without waiting out the poll interval.
    Wake,
    Shutdown,
}

/// A reliable message transport multiplexing many peers over one UDP socket.
///
/// The socket belongs to a background thread that reads, acknowledges, retries, sends
/// and sweeps idle peers. Callers only ever touch the queues, under short locks.
///
/// # Examples
/// ```no_run
/// use gramlink_host::Link;
/// use gramlink_protocol::MessageFlags;
///
/// let server = Link::bind("127.0.0.1:9000").unwrap();
/// let client = Link::bind_any().unwrap();
///
/// let peer = client.add_peer(server.local_addr());
/// client.send_message(peer, 1, b"hello".to_vec(), MessageFlags::RELIABLE);
///
/// loop {
///     if let Some(message) = server.get_message(None) {
///         assert_eq!(message.payload(), b"hello");
///         break;
///     }
///     std::thread::sleep(std::time::Duration::from_millis(10));
/// }
/// ```
pub struct Link {
    shared: Arc<LinkShared>,
    signals: Sender<Signal>,
    io_thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("local_addr", &self.shared.local_addr)
            .field("peers", &self.peer_count())
            .field("running", &self.io_thread.is_some())
            .finish()
    }
}

impl Link {
    /// Binds to `addresses` with default configuration and starts the I/O thread.
    pub fn bind<A: ToSocketAddrs>(addresses: A) -> Result<Self> {
        Self::bind_with_config(addresses, LinkConfig::default())
    }

    /// Binds to an ephemeral localhost port with default configuration.
    pub fn bind_any() -> Result<Self> {
        Self::bind_any_with_config(LinkConfig::default())
    }

    /// Binds to an ephemeral localhost port with the specified configuration.
    pub fn bind_any_with_config(config: LinkConfig) -> Result<Self> {
        let loopback = Ipv4Addr::new(127, 0, 0, 1);
        Self::bind_with_config(SocketAddrV4::new(loopback, 0), config)
    }

    /// Binds to `addresses` with custom configuration.
    pub fn bind_with_config<A: ToSocketAddrs>(addresses: A, config: LinkConfig) -> Result<Self> {
        config.validate()?;
        let socket = UdpTransport::new(UdpSocket::bind(addresses)?, &config)?;
        Self::spawn(socket, config, Arc::new(SystemClock), None)
    }

    /// Binds with an interceptor that sees every raw datagram, e.g. a security layer.
    pub fn bind_with_interceptor<A: ToSocketAddrs>(
        addresses: A,
        config: LinkConfig,
        interceptor: Box<dyn Interceptor>,
    ) -> Result<Self> {
        config.validate()?;
        let socket = UdpTransport::new(UdpSocket::bind(addresses)?, &config)?;
        Self::spawn(socket, config, Arc::new(SystemClock), Some(interceptor))
    }

    /// Starts a link over any `Socket` implementation.
    pub fn spawn<S: Socket + Send + 'static>(
        socket: S,
        config: LinkConfig,
        clock: Arc<dyn Clock>,
        interceptor: Option<Box<dyn Interceptor>>,
    ) -> Result<Self> {
        let (mut link, driver, signals) = Self::build(socket, config, clock, interceptor)?;
        let shared = Arc::clone(&link.shared);
        let handle = thread::Builder::new()
            .name(format!("gramlink-io-{}", shared.local_addr))
            .spawn(move || run_io_loop(driver, shared, signals))?;
        link.io_thread = Some(handle);
        Ok(link)
    }

    /// Creates a link without a background thread.
    ///
    /// The caller drives I/O by calling `LinkDriver::poll` with explicit timestamps.
    pub fn manual<S: Socket>(
        socket: S,
        config: LinkConfig,
        clock: Arc<dyn Clock>,
        interceptor: Option<Box<dyn Interceptor>>,
    ) -> Result<(Self, LinkDriver<S>)> {
        let (link, driver, _signals) = Self::build(socket, config, clock, interceptor)?;
        Ok((link, driver))
    }

    fn build<S: Socket>(
        socket: S,
        config: LinkConfig,
        clock: Arc<dyn Clock>,
        interceptor: Option<Box<dyn Interceptor>>,
    ) -> Result<(Self, LinkDriver<S>, Receiver<Signal>)> {
        config.validate()?;
        let local_addr = socket.local_addr()?;
        let shared = Arc::new(LinkShared {
            state: Mutex::new(LinkState::new(config.peer_id_base)),
            counters: LinkCounters::default(),
            shutdown: AtomicBool::new(false),
            clock,
            local_addr,
            config,
        });
        let (signals, receiver) = bounded(1);
        let driver = LinkDriver::new(socket, Arc::clone(&shared), interceptor);
        Ok((Link { shared, signals, io_thread: None }, driver, receiver))
    }

    /// Registers `address` and returns its peer id. Known addresses keep their id.
    pub fn add_peer(&self, address: SocketAddr) -> PeerId {
        let now = self.shared.clock.now();
        let mut state = self.shared.state();
        state.peers.get_or_create(address, &self.shared.config, now).0
    }

    /// Queues a message for a peer.
    ///
    /// Returns false, dropping the message, if `kind` is reserved, the peer is unknown,
    /// the link is shut down, or the peer's send queue is full (its status then reads
    /// `SendOverflow`).
    pub fn send_message(&self, peer_id: PeerId, kind: u8, payload: impl Into<Vec<u8>>, flags: MessageFlags) -> bool {
        if self.shared.is_shut_down() {
            return false;
        }
        if let Err(err) = validate_message_type(kind) {
            debug!("Refusing message for peer {}: {}", peer_id, err);
            return false;
        }
        let Some(peer) = self.shared.state().peers.get(peer_id) else {
            debug!("Dropping message: {}", ErrorKind::UnreachablePeer(peer_id));
            return false;
        };

        let queued = peer.lock().send_message(Message::new(peer_id, kind, payload, flags));
        match queued {
            Ok(()) => {
                let _ = self.signals.try_send(Signal::Wake);
                true
            }
            // The peer already warned about its full queue.
            Err(err) if err.is_overflow() => false,
            Err(err) => {
                warn!("Dropping message for peer {}: {}", peer_id, err);
                false
            }
        }
    }

    /// Takes the next received message.
    ///
    /// Without a peer id, messages come out in arrival order across all peers; each is
    /// the lowest-sequence message of its peer, so per-peer order holds. With a peer id,
    /// only that peer's queue is consulted.
    pub fn get_message(&self, peer_id: Option<PeerId>) -> Option<Message> {
        let mut state = self.shared.state();
        match peer_id {
            None => {
                while let Some(ticket) = state.receive_order.pop_front() {
                    let Some(peer) = state.peers.get(ticket) else { continue };
                    let message = peer.lock().pop_message();
                    if message.is_some() {
                        return message;
                    }
                }
                None
            }
            Some(peer_id) => {
                let peer = state.peers.get(peer_id)?;
                let message = peer.lock().pop_message()?;
                if let Some(position) = state.receive_order.iter().position(|ticket| *ticket == peer_id) {
                    state.receive_order.remove(position);
                }
                Some(message)
            }
        }
    }

    /// Messages waiting to be taken, across all peers.
    pub fn pending_messages(&self) -> usize {
        self.shared.state().receive_order.len()
    }

    /// Overflow status of a peer.
    pub fn peer_status(&self, peer_id: PeerId) -> Option<PeerStatus> {
        let peer = self.shared.state().peers.get(peer_id)?;
        let status = peer.lock().status();
        Some(status)
    }

    /// Clears a peer's overflow status. Returns false for unknown peers.
    pub fn reset_peer_status(&self, peer_id: PeerId) -> bool {
        self.with_peer(peer_id, |peer| peer.reset_status())
    }

    /// Replaces a peer's throttles. Returns false for unknown peers.
    pub fn set_peer_limits(&self, peer_id: PeerId, limits: PeerLimits) -> bool {
        self.with_peer(peer_id, |peer| peer.set_limits(limits))
    }

    /// Copy of a peer's counters.
    pub fn peer_statistics(&self, peer_id: PeerId) -> Option<PeerStatistics> {
        let peer = self.shared.state().peers.get(peer_id)?;
        let statistics = peer.lock().statistics().clone();
        Some(statistics)
    }

    /// Remote address of a peer.
    pub fn peer_address(&self, peer_id: PeerId) -> Option<SocketAddr> {
        let peer = self.shared.state().peers.get(peer_id)?;
        let address = peer.lock().address();
        Some(address)
    }

    /// Id of the peer at `address`, if known.
    pub fn peer_id(&self, address: &SocketAddr) -> Option<PeerId> {
        self.shared.state().peers.id_for(address)
    }

    /// Whether a peer is still registered. Evicted peers disappear from the table.
    pub fn has_peer(&self, peer_id: PeerId) -> bool {
        self.shared.state().peers.get(peer_id).is_some()
    }

    /// Registered peer ids, ascending.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.shared.state().peers.ids()
    }

    /// Number of registered peers.
    pub fn peer_count(&self) -> usize {
        self.shared.state().peers.len()
    }

    /// Snapshot of the link-wide counters.
    pub fn counters(&self) -> CounterSnapshot {
        self.shared.counters.snapshot()
    }

    /// Smoothed round-trip lag in milliseconds.
    pub fn lag_ms(&self) -> f64 {
        self.shared.counters.lag_ms()
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// The configuration the link was built with.
    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    /// Whether `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shut_down()
    }

    /// Stops the I/O thread and discards all peers, unacknowledged datagrams and
    /// undelivered messages. Waits at most `shutdown_timeout` for the thread.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let _ = self.signals.try_send(Signal::Shutdown);

        if let Some(handle) = self.io_thread.take() {
            join_bounded(handle, self.shared.config.shutdown_timeout);
        }

        let mut state = self.shared.state();
        *state = LinkState::new(self.shared.config.peer_id_base);
    }

    fn with_peer(&self, peer_id: PeerId, apply: impl FnOnce(&mut gramlink_peer::Peer)) -> bool {
        let Some(peer) = self.shared.state().peers.get(peer_id) else {
            return false;
        };
        apply(&mut *peer.lock());
        true
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_io_loop<S: Socket>(mut driver: LinkDriver<S>, shared: Arc<LinkShared>, signals: Receiver<Signal>) {
    let poll_interval = shared.config.poll_interval;
    debug!("I/O loop started on {}", shared.local_addr);
    while !shared.is_shut_down() {
        driver.poll(shared.clock.now());
        match signals.recv_timeout(poll_interval) {
            Ok(Signal::Wake) | Err(RecvTimeoutError::Timeout) => {}
            Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("I/O loop on {} stopped", shared.local_addr);
}

fn join_bounded(handle: JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("I/O thread still running after {:?}, detaching it", timeout);
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        error!("I/O thread panicked");
    }
}
