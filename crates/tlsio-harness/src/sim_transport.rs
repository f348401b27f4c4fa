//! Scripted network collaborators for deterministic testing.
//!
//! [`SimNetwork`] implements the DNS, socket and TLS capabilities of
//! `tlsio-core` against an in-memory script. Tests decide how long each
//! opening step stays pending, which step fails, how many bytes each write
//! accepts and what the peer sends. Every resource handed to the connection
//! records its release, so leaks and double frees show up in
//! [`ResourceStats`].
//!
//! # Determinism
//!
//! Random write and read chunking draws from a `ChaCha20Rng` seeded at
//! construction. Same seed, same script, same calls: same outcome.

use std::{
    cell::RefCell,
    collections::VecDeque,
    io,
    net::{Ipv4Addr, SocketAddrV4},
    rc::Rc,
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tlsio_core::{
    TlsIoError,
    resolver::{DnsLookup, DnsPrimitive},
    socket::{PendingSocket, SocketPrimitive},
    tls::{TlsPrimitive, TlsRecordIo},
};

/// Address returned by lookups unless a test says otherwise.
pub const DEFAULT_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 10);

/// How many bytes each record-layer write accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Accept everything offered
    Unlimited,
    /// Accept at most this many bytes per call (0 blocks forever)
    Chunked(usize),
    /// Accept a seeded-random amount in `0..=max`; 0 means would-block
    Random {
        /// Upper bound per call
        max: usize,
    },
    /// Never accept anything
    Blocked,
}

/// How queued inbound data is split across reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Each delivered chunk is returned whole (up to the caller's buffer)
    AsDelivered,
    /// Each read returns a seeded-random non-empty prefix
    Random,
}

/// TLS setup steps that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsStep {
    /// Context creation
    Context,
    /// Session creation
    Session,
    /// Binding the socket to the session
    Bind,
}

/// Creation and release counts for every resource kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceStats {
    /// DNS lookups started
    pub lookups_started: usize,
    /// DNS lookups released
    pub lookups_released: usize,
    /// Sockets created
    pub sockets_opened: usize,
    /// Sockets closed
    pub sockets_closed: usize,
    /// TLS contexts created
    pub contexts_created: usize,
    /// TLS contexts freed
    pub contexts_freed: usize,
    /// TLS sessions created
    pub sessions_created: usize,
    /// TLS sessions freed
    pub sessions_freed: usize,
    /// close_notify sent
    pub shutdowns: usize,
}

impl ResourceStats {
    /// Whether everything created has been released exactly once.
    pub fn all_released(&self) -> bool {
        self.lookups_started == self.lookups_released
            && self.sockets_opened == self.sockets_closed
            && self.contexts_created == self.contexts_freed
            && self.sessions_created == self.sessions_freed
    }
}

struct NetState {
    rng: ChaCha20Rng,

    answer: Option<Ipv4Addr>,
    dns_delay: u32,
    refuse_lookups: bool,

    connect_delay: u32,
    connect_error: Option<io::ErrorKind>,
    refuse_connects: bool,

    failing_tls_step: Option<TlsStep>,
    handshake_delay: u32,
    handshake_fails: bool,

    write_mode: WriteMode,
    read_mode: ReadMode,
    inbound: VecDeque<Vec<u8>>,
    read_fault: Option<io::ErrorKind>,
    write_fault: Option<io::ErrorKind>,

    written: Vec<u8>,
    write_calls: Vec<(usize, usize)>,
    connect_addrs: Vec<SocketAddrV4>,
    server_names: Vec<String>,
    stats: ResourceStats,
}

impl NetState {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            answer: Some(DEFAULT_ADDRESS),
            dns_delay: 0,
            refuse_lookups: false,
            connect_delay: 0,
            connect_error: None,
            refuse_connects: false,
            failing_tls_step: None,
            handshake_delay: 0,
            handshake_fails: false,
            write_mode: WriteMode::Unlimited,
            read_mode: ReadMode::AsDelivered,
            inbound: VecDeque::new(),
            read_fault: None,
            write_fault: None,
            written: Vec::new(),
            write_calls: Vec::new(),
            connect_addrs: Vec::new(),
            server_names: Vec::new(),
            stats: ResourceStats::default(),
        }
    }
}

type Shared = Rc<RefCell<NetState>>;

/// In-memory network: DNS, sockets, TLS and the peer in one script.
///
/// Clones share the same script, so a test keeps one handle to steer and
/// observe while the connection owns others.
#[derive(Clone)]
pub struct SimNetwork {
    state: Shared,
}

impl SimNetwork {
    /// Create a network whose steps all succeed immediately.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create a network with a specific chunking seed.
    pub fn with_seed(seed: u64) -> Self {
        Self { state: Rc::new(RefCell::new(NetState::new(seed))) }
    }

    /// Lookups resolve to `addr`.
    pub fn resolve_to(&self, addr: Ipv4Addr) -> &Self {
        self.state.borrow_mut().answer = Some(addr);
        self
    }

    /// Lookups complete without an address.
    pub fn fail_dns(&self) -> &Self {
        self.state.borrow_mut().answer = None;
        self
    }

    /// Lookups stay pending for `polls` completion checks.
    pub fn dns_delay(&self, polls: u32) -> &Self {
        self.state.borrow_mut().dns_delay = polls;
        self
    }

    /// Lookups cannot even be started.
    pub fn refuse_lookups(&self) -> &Self {
        self.state.borrow_mut().refuse_lookups = true;
        self
    }

    /// Connects stay pending for `polls` progress checks.
    pub fn connect_delay(&self, polls: u32) -> &Self {
        self.state.borrow_mut().connect_delay = polls;
        self
    }

    /// Connects fail with `kind` once they stop pending.
    pub fn fail_connect(&self, kind: io::ErrorKind) -> &Self {
        self.state.borrow_mut().connect_error = Some(kind);
        self
    }

    /// Sockets cannot even be created.
    pub fn refuse_connects(&self) -> &Self {
        self.state.borrow_mut().refuse_connects = true;
        self
    }

    /// Make one TLS setup step fail.
    pub fn fail_tls_step(&self, step: TlsStep) -> &Self {
        self.state.borrow_mut().failing_tls_step = Some(step);
        self
    }

    /// Handshakes stay pending for `polls` steps.
    pub fn handshake_delay(&self, polls: u32) -> &Self {
        self.state.borrow_mut().handshake_delay = polls;
        self
    }

    /// Handshakes fail once they stop pending.
    pub fn fail_handshake(&self) -> &Self {
        self.state.borrow_mut().handshake_fails = true;
        self
    }

    /// Set how much each write accepts.
    pub fn write_mode(&self, mode: WriteMode) -> &Self {
        self.state.borrow_mut().write_mode = mode;
        self
    }

    /// Set how inbound data is split across reads.
    pub fn read_mode(&self, mode: ReadMode) -> &Self {
        self.state.borrow_mut().read_mode = mode;
        self
    }

    /// Queue decrypted application data from the peer.
    pub fn deliver(&self, bytes: &[u8]) -> &Self {
        if !bytes.is_empty() {
            self.state.borrow_mut().inbound.push_back(bytes.to_vec());
        }
        self
    }

    /// The next read fails with `kind`.
    pub fn fail_next_read(&self, kind: io::ErrorKind) -> &Self {
        self.state.borrow_mut().read_fault = Some(kind);
        self
    }

    /// The next write fails with `kind`.
    pub fn fail_next_write(&self, kind: io::ErrorKind) -> &Self {
        self.state.borrow_mut().write_fault = Some(kind);
        self
    }

    /// Every byte the peer has received, in order.
    pub fn written(&self) -> Vec<u8> {
        self.state.borrow().written.clone()
    }

    /// `(offered, accepted)` for every write call.
    pub fn write_calls(&self) -> Vec<(usize, usize)> {
        self.state.borrow().write_calls.clone()
    }

    /// Addresses connects were started to.
    pub fn connect_addrs(&self) -> Vec<SocketAddrV4> {
        self.state.borrow().connect_addrs.clone()
    }

    /// Server names sessions were created for.
    pub fn server_names(&self) -> Vec<String> {
        self.state.borrow().server_names.clone()
    }

    /// Inbound bytes not yet read.
    pub fn undelivered(&self) -> usize {
        self.state.borrow().inbound.iter().map(Vec::len).sum()
    }

    /// Resource creation and release counts.
    pub fn stats(&self) -> ResourceStats {
        self.state.borrow().stats.clone()
    }
}

impl Default for SimNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SimNetwork")
            .field("written", &state.written.len())
            .field("inbound", &state.inbound.len())
            .field("stats", &state.stats)
            .finish()
    }
}

fn would_block() -> io::Error {
    io::ErrorKind::WouldBlock.into()
}

// Counts down `remaining`; true once it has reached zero.
fn countdown(remaining: &mut u32) -> bool {
    if *remaining == 0 {
        return true;
    }
    *remaining -= 1;
    false
}

/// In-flight scripted lookup.
pub struct SimLookup {
    state: Shared,
    remaining: u32,
}

impl DnsLookup for SimLookup {
    fn is_complete(&mut self) -> bool {
        countdown(&mut self.remaining)
    }

    fn result(&self) -> Option<Ipv4Addr> {
        self.state.borrow().answer
    }
}

impl Drop for SimLookup {
    fn drop(&mut self) {
        self.state.borrow_mut().stats.lookups_released += 1;
    }
}

impl DnsPrimitive for SimNetwork {
    type Lookup = SimLookup;

    fn begin_lookup(&mut self, hostname: &str) -> tlsio_core::Result<SimLookup> {
        let mut state = self.state.borrow_mut();
        if state.refuse_lookups {
            return Err(TlsIoError::Dns(format!("lookup of {hostname} refused")));
        }
        state.stats.lookups_started += 1;
        Ok(SimLookup { state: self.state.clone(), remaining: state.dns_delay })
    }
}

/// Scripted socket.
pub struct SimSocket {
    state: Shared,
    remaining: u32,
    error: Option<io::ErrorKind>,
}

impl PendingSocket for SimSocket {
    fn poll_connect(&mut self) -> io::Result<bool> {
        if !countdown(&mut self.remaining) {
            return Ok(false);
        }
        match self.error {
            Some(kind) => Err(kind.into()),
            None => Ok(true),
        }
    }
}

impl Drop for SimSocket {
    fn drop(&mut self) {
        self.state.borrow_mut().stats.sockets_closed += 1;
    }
}

impl SocketPrimitive for SimNetwork {
    type Socket = SimSocket;

    fn begin_connect(&mut self, addr: SocketAddrV4) -> tlsio_core::Result<SimSocket> {
        let mut state = self.state.borrow_mut();
        if state.refuse_connects {
            return Err(TlsIoError::Connect(format!("socket for {addr} refused")));
        }
        state.stats.sockets_opened += 1;
        state.connect_addrs.push(addr);
        Ok(SimSocket {
            state: self.state.clone(),
            remaining: state.connect_delay,
            error: state.connect_error,
        })
    }
}

/// Scripted TLS context.
pub struct SimContext {
    state: Shared,
}

impl Drop for SimContext {
    fn drop(&mut self) {
        self.state.borrow_mut().stats.contexts_freed += 1;
    }
}

/// Scripted TLS session; the far end is the script's peer.
pub struct SimSession {
    state: Shared,
    handshake_remaining: u32,
    handshake_fails: bool,
    socket: Option<SimSocket>,
}

impl Drop for SimSession {
    fn drop(&mut self) {
        self.state.borrow_mut().stats.sessions_freed += 1;
    }
}

impl TlsPrimitive for SimNetwork {
    type Socket = SimSocket;
    type Context = SimContext;
    type Session = SimSession;

    fn new_context(&mut self) -> tlsio_core::Result<SimContext> {
        let mut state = self.state.borrow_mut();
        if state.failing_tls_step == Some(TlsStep::Context) {
            return Err(TlsIoError::Tls("context creation failed".to_string()));
        }
        state.stats.contexts_created += 1;
        Ok(SimContext { state: self.state.clone() })
    }

    fn new_session(
        &mut self,
        _context: &SimContext,
        server_name: &str,
    ) -> tlsio_core::Result<SimSession> {
        let mut state = self.state.borrow_mut();
        if state.failing_tls_step == Some(TlsStep::Session) {
            return Err(TlsIoError::Tls("session creation failed".to_string()));
        }
        state.stats.sessions_created += 1;
        state.server_names.push(server_name.to_string());
        Ok(SimSession {
            state: self.state.clone(),
            handshake_remaining: state.handshake_delay,
            handshake_fails: state.handshake_fails,
            socket: None,
        })
    }

    fn bind_socket(&mut self, session: &mut SimSession, socket: SimSocket) -> tlsio_core::Result<()> {
        let fails = self.state.borrow().failing_tls_step == Some(TlsStep::Bind);
        if fails {
            return Err(TlsIoError::Tls("socket bind failed".to_string()));
        }
        session.socket = Some(socket);
        Ok(())
    }
}

impl TlsRecordIo for SimSession {
    fn handshake_step(&mut self) -> io::Result<()> {
        if self.socket.is_none() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "no socket bound"));
        }
        if !countdown(&mut self.handshake_remaining) {
            return Err(would_block());
        }
        if self.handshake_fails {
            return Err(io::Error::other("handshake_failure alert"));
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if let Some(kind) = state.read_fault.take() {
            tracing::debug!(?kind, "injecting read fault");
            return Err(kind.into());
        }

        let Some(mut chunk) = state.inbound.pop_front() else {
            return Err(would_block());
        };

        let mut n = chunk.len().min(buf.len());
        if state.read_mode == ReadMode::Random && n > 1 {
            n = state.rng.gen_range(1..=n);
        }
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            chunk.drain(..n);
            state.inbound.push_front(chunk);
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if let Some(kind) = state.write_fault.take() {
            tracing::debug!(?kind, "injecting write fault");
            return Err(kind.into());
        }

        let accepted = match state.write_mode {
            WriteMode::Unlimited => buf.len(),
            WriteMode::Chunked(limit) => limit.min(buf.len()),
            WriteMode::Random { max } => {
                let upper = max.min(buf.len());
                state.rng.gen_range(0..=upper)
            },
            WriteMode::Blocked => 0,
        };

        state.write_calls.push((buf.len(), accepted));
        if accepted == 0 && !buf.is_empty() {
            return Err(would_block());
        }
        state.written.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn shutdown(&mut self) {
        self.state.borrow_mut().stats.shutdowns += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_counts_down_and_releases() {
        let mut net = SimNetwork::new();
        net.dns_delay(2);

        let mut lookup = net.begin_lookup("example.test").unwrap();
        assert!(!lookup.is_complete());
        assert!(!lookup.is_complete());
        assert!(lookup.is_complete());
        assert_eq!(lookup.result(), Some(DEFAULT_ADDRESS));

        drop(lookup);
        let stats = net.stats();
        assert_eq!((stats.lookups_started, stats.lookups_released), (1, 1));
    }

    #[test]
    fn failed_bind_closes_socket() {
        let mut net = SimNetwork::new();
        net.fail_tls_step(TlsStep::Bind);

        let socket = net.begin_connect(SocketAddrV4::new(DEFAULT_ADDRESS, 443)).unwrap();
        let context = net.new_context().unwrap();
        let mut session = net.new_session(&context, "example.test").unwrap();
        assert!(net.bind_socket(&mut session, socket).is_err());
        drop(session);
        drop(context);

        assert!(net.stats().all_released());
    }

    #[test]
    fn random_read_chunks_preserve_bytes() {
        let mut net = SimNetwork::with_seed(7);
        net.read_mode(ReadMode::Random).deliver(b"abcdefghij");
        let socket = net.begin_connect(SocketAddrV4::new(DEFAULT_ADDRESS, 443)).unwrap();
        let context = net.new_context().unwrap();
        let mut session = net.new_session(&context, "example.test").unwrap();
        net.bind_socket(&mut session, socket).unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 4];
        while let Ok(n) = session.read(&mut buf) {
            assert!(n >= 1 && n <= 4);
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b"abcdefghij");
    }

    #[test]
    fn chunked_writes_record_calls() {
        let mut net = SimNetwork::new();
        net.write_mode(WriteMode::Chunked(3));
        let socket = net.begin_connect(SocketAddrV4::new(DEFAULT_ADDRESS, 443)).unwrap();
        let context = net.new_context().unwrap();
        let mut session = net.new_session(&context, "example.test").unwrap();
        net.bind_socket(&mut session, socket).unwrap();

        assert_eq!(session.write(b"hello").unwrap(), 3);
        assert_eq!(session.write(b"lo").unwrap(), 2);
        assert_eq!(net.write_calls(), vec![(5, 3), (2, 2)]);
        assert_eq!(net.written(), b"hello");
    }
}
