//! TLS connection state machine.
//!
//! A [`Connection`] drives one client connection from hostname to encrypted
//! byte stream without ever blocking. All progress happens in
//! [`Connection::do_work`], which performs at most one state transition per
//! call; the caller decides the polling cadence.
//!
//! # State Machine
//!
//! ```text
//!            open                resolved             connected
//! ┌─────────┐   ┌─────────────┐          ┌───────────────┐         ┌─────────────┐
//! │ NotOpen │──>│ OpeningDns  │─────────>│ OpeningSocket │────────>│ OpeningTls  │
//! └─────────┘   └─────────────┘          └───────────────┘         └─────────────┘
//!      ↑               │                         │                        │ handshake done
//!      │               │ failure / timeout       │                        ↓
//!      │               ↓                         ↓                  ┌──────────┐
//!      │          ┌─────────┐<────────────────────────────────────────│   Open   │
//!      │          │  Error  │        hard read/write failure        └──────────┘
//!      │          └─────────┘                                            │
//!      │               │ close                                           │ close
//!      └───────────────┴─────────────────────────────────────────────────┘
//! ```
//!
//! # Timeouts
//!
//! - **Open timeout**: one deadline armed by `open`, shared by DNS, connect
//!   and handshake.
//! - **Send timeout**: armed per message when it first reaches the head of
//!   the send queue. An expired send fails on its own; the connection stays
//!   open.
//!
//! # Resources
//!
//! Each phase owns exactly the resources it needs: the DNS lookup while
//! resolving, the socket while connecting, the TLS session (which owns the
//! socket) from handshake onwards. Leaving a phase drops what it owned, so
//! every resource is released exactly once on every exit path.

use std::{fmt, mem, net::SocketAddrV4};

use crate::{
    completion::{
        Completion, OnBytesReceived, OnCloseComplete, OnIoError, OnOpenComplete, OnSendComplete,
    },
    config::TlsIoConfig,
    env::Clock,
    error::{Result, TlsIoError},
    options::{OptionValue, TransportOptions},
    resolver::{DnsPrimitive, ResolvePoll, Resolution},
    send_queue::SendQueue,
    socket::{ConnectPoll, Establishment, SocketPrimitive},
    timeout::Deadline,
    tls::{TlsOutcome, TlsPrimitive, TlsSession},
    transport::Transport,
};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created or closed; nothing in flight
    NotOpen,
    /// Waiting for hostname resolution
    OpeningDns,
    /// Waiting for the TCP connect to finish
    OpeningSocket,
    /// Waiting for the TLS handshake to finish
    OpeningTls,
    /// Handshake complete; bytes flow both ways
    Open,
    /// Failed; only `close` leaves this state
    Error,
}

impl ConnectionState {
    /// Whether this is one of the opening sub-states.
    #[must_use]
    pub fn is_opening(self) -> bool {
        matches!(
            self,
            ConnectionState::OpeningDns | ConnectionState::OpeningSocket | ConnectionState::OpeningTls
        )
    }
}

/// The platform capabilities a connection is built from.
#[derive(Debug, Clone)]
pub struct Collaborators<C, D, S, T> {
    /// Time source for deadlines
    pub clock: C,
    /// Hostname resolution
    pub dns: D,
    /// Non-blocking TCP connect
    pub sockets: S,
    /// TLS contexts and sessions
    pub tls: T,
}

impl<C, D, S, T> Collaborators<C, D, S, T> {
    /// Bundle the four capabilities.
    pub fn new(clock: C, dns: D, sockets: S, tls: T) -> Self {
        Self { clock, dns, sockets, tls }
    }
}

enum Phase<L, P, T: TlsPrimitive> {
    NotOpen,
    OpeningDns(Resolution<L>),
    OpeningSocket(Establishment<P>),
    OpeningTls(TlsSession<T>),
    Open(TlsSession<T>),
    Error,
}

impl<L, P, T: TlsPrimitive> Phase<L, P, T> {
    fn state(&self) -> ConnectionState {
        match self {
            Phase::NotOpen => ConnectionState::NotOpen,
            Phase::OpeningDns(_) => ConnectionState::OpeningDns,
            Phase::OpeningSocket(_) => ConnectionState::OpeningSocket,
            Phase::OpeningTls(_) => ConnectionState::OpeningTls,
            Phase::Open(_) => ConnectionState::Open,
            Phase::Error => ConnectionState::Error,
        }
    }
}

// Present from a successful `open` until `close`.
struct Callbacks {
    on_open_complete: Option<OnOpenComplete>,
    on_bytes_received: OnBytesReceived,
    on_io_error: OnIoError,
}

/// A single non-blocking TLS client connection.
pub struct Connection<C, D, S, T>
where
    C: Clock,
    D: DnsPrimitive,
    S: SocketPrimitive,
    T: TlsPrimitive<Socket = S::Socket>,
{
    config: TlsIoConfig,
    collaborators: Collaborators<C, D, S, T>,
    phase: Phase<D::Lookup, S::Socket, T>,
    callbacks: Option<Callbacks>,
    open_deadline: Option<Deadline<C::Instant>>,
    queue: SendQueue<C::Instant>,
    read_buf: Vec<u8>,
}

impl<C, D, S, T> Connection<C, D, S, T>
where
    C: Clock,
    D: DnsPrimitive,
    S: SocketPrimitive,
    T: TlsPrimitive<Socket = S::Socket>,
{
    /// Create a connection in [`ConnectionState::NotOpen`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configuration is unusable, or
    /// `Allocation` if the read buffer cannot be reserved.
    pub fn create(config: TlsIoConfig, collaborators: Collaborators<C, D, S, T>) -> Result<Self> {
        config.validate()?;

        let mut read_buf = Vec::new();
        read_buf
            .try_reserve_exact(config.read_chunk_size)
            .map_err(|_| TlsIoError::Allocation { size: config.read_chunk_size })?;
        read_buf.resize(config.read_chunk_size, 0);

        tracing::debug!(host = %config.host, port = config.port, "connection created");

        Ok(Self {
            config,
            collaborators,
            phase: Phase::NotOpen,
            callbacks: None,
            open_deadline: None,
            queue: SendQueue::new(),
            read_buf,
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.phase.state()
    }

    /// Configured hostname.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Configured port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Configuration the connection was created with.
    #[must_use]
    pub fn config(&self) -> &TlsIoConfig {
        &self.config
    }

    /// Number of sends not yet completed.
    #[must_use]
    pub fn pending_sends(&self) -> usize {
        self.queue.len()
    }

    /// Begin opening the connection.
    ///
    /// On success the connection is in `OpeningDns` and `on_open_complete`
    /// will fire from a later `do_work` (or with `Cancelled` from `close`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the connection is not `NotOpen`, or `Dns` if
    /// the lookup could not be started. In both cases `on_open_complete`
    /// fires immediately with `Error` and any attempt already in flight is
    /// left untouched.
    pub fn open(
        &mut self,
        on_open_complete: impl FnOnce(Completion) + 'static,
        on_bytes_received: impl FnMut(&[u8]) + 'static,
        on_io_error: impl FnMut(&TlsIoError) + 'static,
    ) -> Result<()> {
        self.open_boxed(
            Box::new(on_open_complete),
            Box::new(on_bytes_received),
            Box::new(on_io_error),
        )
    }

    fn open_boxed(
        &mut self,
        on_open_complete: OnOpenComplete,
        on_bytes_received: OnBytesReceived,
        on_io_error: OnIoError,
    ) -> Result<()> {
        if !matches!(self.phase, Phase::NotOpen) {
            let err = TlsIoError::InvalidState { state: self.state(), operation: "open" };
            tracing::warn!(host = %self.config.host, state = ?self.state(), "open rejected");
            on_open_complete(Completion::Error);
            return Err(err);
        }

        let resolution = match Resolution::begin(&mut self.collaborators.dns, &self.config.host) {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::error!(host = %self.config.host, error = %e, "dns lookup failed to start");
                on_open_complete(Completion::Error);
                return Err(e);
            },
        };

        let now = self.collaborators.clock.now();
        self.callbacks =
            Some(Callbacks { on_open_complete: Some(on_open_complete), on_bytes_received, on_io_error });
        self.open_deadline = Some(Deadline::start(now, self.config.operation_timeout));
        self.phase = Phase::OpeningDns(resolution);

        tracing::debug!(host = %self.config.host, port = self.config.port, "opening");
        Ok(())
    }

    /// Close the connection and release everything it holds.
    ///
    /// An open still in progress completes with `Cancelled`, then every
    /// queued send completes with `Cancelled` in FIFO order, then
    /// `on_close_complete` fires. The connection returns to `NotOpen` and
    /// may be opened again.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the connection is already `NotOpen`.
    /// `on_close_complete` still fires.
    pub fn close(&mut self, on_close_complete: impl FnOnce() + 'static) -> Result<()> {
        self.close_boxed(Box::new(on_close_complete))
    }

    fn close_boxed(&mut self, on_close_complete: OnCloseComplete) -> Result<()> {
        if matches!(self.phase, Phase::NotOpen) {
            tracing::debug!(host = %self.config.host, "close on a connection that is not open");
            on_close_complete();
            return Err(TlsIoError::InvalidState {
                state: ConnectionState::NotOpen,
                operation: "close",
            });
        }

        self.teardown();
        on_close_complete();
        Ok(())
    }

    /// Queue `bytes` for transmission.
    ///
    /// The bytes are copied; the caller's buffer may be reused immediately.
    /// `on_send_complete` fires exactly once: `Ok` once every byte has been
    /// accepted by the TLS session, `Error` on timeout or write failure,
    /// `Cancelled` if the connection is closed first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless `Open`, or `Allocation` if the copy
    /// could not be made. `on_send_complete` is dropped without firing.
    pub fn send(
        &mut self,
        bytes: &[u8],
        on_send_complete: impl FnOnce(Completion) + 'static,
    ) -> Result<()> {
        self.send_boxed(bytes, Box::new(on_send_complete))
    }

    fn send_boxed(&mut self, bytes: &[u8], on_send_complete: OnSendComplete) -> Result<()> {
        if !matches!(self.phase, Phase::Open(_)) {
            return Err(TlsIoError::InvalidState { state: self.state(), operation: "send" });
        }

        self.queue.enqueue(bytes, on_send_complete)?;
        tracing::trace!(len = bytes.len(), queued = self.queue.len(), "send queued");
        Ok(())
    }

    /// Make at most one unit of progress.
    ///
    /// - Opening states: poll the in-flight step once, advance on success,
    ///   move to `Error` on failure or when the open deadline has passed.
    /// - `Open`: read once, then service the head of the send queue once.
    /// - `NotOpen` and `Error`: nothing.
    pub fn do_work(&mut self) {
        let phase = mem::replace(&mut self.phase, Phase::NotOpen);
        match phase {
            Phase::NotOpen | Phase::Error => self.phase = phase,
            Phase::OpeningDns(resolution) => self.poll_resolution(resolution),
            Phase::OpeningSocket(establishment) => self.poll_connect(establishment),
            Phase::OpeningTls(session) => self.poll_handshake(session),
            Phase::Open(session) => self.pump(session),
        }
    }

    /// Accept an option. The TLS transport has none, so every name and
    /// value is ignored.
    ///
    /// # Errors
    ///
    /// Never fails. The `Result` matches [`Transport::set_option`].
    pub fn set_option(&mut self, name: &str, value: OptionValue) -> Result<()> {
        tracing::debug!(option = name, ?value, "option ignored");
        Ok(())
    }

    /// Options needed to recreate this connection. Always empty.
    #[must_use]
    pub fn retrieve_options(&self) -> TransportOptions {
        TransportOptions::new()
    }

    fn poll_resolution(&mut self, mut resolution: Resolution<D::Lookup>) {
        match resolution.poll() {
            ResolvePoll::Pending => {
                self.phase = Phase::OpeningDns(resolution);
                self.check_open_deadline();
            },
            ResolvePoll::Failed => {
                drop(resolution);
                let err = TlsIoError::Dns(format!("could not resolve {}", self.config.host));
                self.fail_open(ConnectionState::OpeningDns, err);
            },
            ResolvePoll::Resolved(ip) => {
                drop(resolution);
                let addr = SocketAddrV4::new(ip, self.config.port);
                match Establishment::begin(&mut self.collaborators.sockets, addr) {
                    Ok(establishment) => {
                        tracing::debug!(host = %self.config.host, %addr, "resolved, connecting");
                        self.phase = Phase::OpeningSocket(establishment);
                    },
                    Err(e) => self.fail_open(ConnectionState::OpeningDns, e),
                }
            },
        }
    }

    fn poll_connect(&mut self, mut establishment: Establishment<S::Socket>) {
        match establishment.poll() {
            ConnectPoll::Pending => {
                self.phase = Phase::OpeningSocket(establishment);
                self.check_open_deadline();
            },
            ConnectPoll::Failed(e) => {
                drop(establishment);
                self.fail_open(ConnectionState::OpeningSocket, e);
            },
            ConnectPoll::Connected(socket) => {
                let addr = establishment.addr();
                match TlsSession::establish(&mut self.collaborators.tls, socket, &self.config.host) {
                    Ok(session) => {
                        tracing::debug!(host = %self.config.host, %addr, "connected, handshaking");
                        self.phase = Phase::OpeningTls(session);
                    },
                    Err(e) => self.fail_open(ConnectionState::OpeningSocket, e),
                }
            },
        }
    }

    fn poll_handshake(&mut self, mut session: TlsSession<T>) {
        match session.handshake() {
            TlsOutcome::WouldBlock => {
                self.phase = Phase::OpeningTls(session);
                self.check_open_deadline();
            },
            TlsOutcome::Failed(e) => {
                drop(session);
                self.fail_open(ConnectionState::OpeningTls, e);
            },
            TlsOutcome::Done(()) => {
                self.phase = Phase::Open(session);
                self.open_deadline = None;
                tracing::debug!(host = %self.config.host, port = self.config.port, "open");
                self.complete_open(Completion::Ok);
            },
        }
    }

    // Called with the current phase already stored back.
    fn check_open_deadline(&mut self) {
        let Some(deadline) = self.open_deadline else {
            return;
        };
        let now = self.collaborators.clock.now();
        if let Some(elapsed) = deadline.check(now) {
            let state = self.state();
            self.fail_open(state, TlsIoError::OpenTimeout { state, elapsed });
        }
    }

    fn fail_open(&mut self, from: ConnectionState, err: TlsIoError) {
        self.phase = Phase::Error;
        self.open_deadline = None;
        if err.is_transient() {
            tracing::warn!(host = %self.config.host, state = ?from, error = %err, "open failed");
        } else {
            tracing::error!(host = %self.config.host, state = ?from, error = %err, "open failed");
        }
        self.complete_open(Completion::Error);
    }

    fn complete_open(&mut self, result: Completion) {
        let callback = self.callbacks.as_mut().and_then(|cbs| cbs.on_open_complete.take());
        if let Some(on_open_complete) = callback {
            on_open_complete(result);
        }
    }

    fn notify_io_error(&mut self, err: &TlsIoError) {
        if let Some(callbacks) = self.callbacks.as_mut() {
            (callbacks.on_io_error)(err);
        }
    }

    fn pump(&mut self, mut session: TlsSession<T>) {
        match session.read(&mut self.read_buf) {
            TlsOutcome::Done(n) => {
                tracing::trace!(bytes = n, "received");
                if let Some(callbacks) = self.callbacks.as_mut() {
                    (callbacks.on_bytes_received)(&self.read_buf[..n]);
                }
            },
            TlsOutcome::WouldBlock => {},
            TlsOutcome::Failed(e) => {
                drop(session);
                self.phase = Phase::Error;
                tracing::error!(host = %self.config.host, error = %e, "read failed");
                self.notify_io_error(&e);
                return;
            },
        }

        self.service_head(session);
    }

    fn service_head(&mut self, mut session: TlsSession<T>) {
        let now = self.collaborators.clock.now();
        let Some(head) = self.queue.head_mut() else {
            self.phase = Phase::Open(session);
            return;
        };

        let deadline = head.activate(now, self.config.send_timeout);
        if let Some(elapsed) = deadline.check(now) {
            let err = TlsIoError::SendTimeout { elapsed, unsent: head.unsent() };
            self.phase = Phase::Open(session);
            tracing::warn!(host = %self.config.host, error = %err, "send timed out");
            self.queue.pop_and_complete(Completion::Error);
            self.notify_io_error(&err);
            return;
        }

        if head.unsent() == 0 {
            self.phase = Phase::Open(session);
            self.queue.pop_and_complete(Completion::Ok);
            return;
        }

        match session.write(head.remaining()) {
            TlsOutcome::Done(n) => {
                head.advance(n);
                let finished = head.unsent() == 0;
                tracing::trace!(bytes = n, unsent = head.unsent(), "sent");
                self.phase = Phase::Open(session);
                if finished {
                    self.queue.pop_and_complete(Completion::Ok);
                }
            },
            TlsOutcome::WouldBlock => self.phase = Phase::Open(session),
            TlsOutcome::Failed(e) => {
                drop(session);
                self.phase = Phase::Error;
                tracing::error!(host = %self.config.host, error = %e, "write failed");
                self.queue.pop_and_complete(Completion::Error);
                self.notify_io_error(&e);
            },
        }
    }

    // Everything `close` does except the close callback.
    fn teardown(&mut self) {
        let phase = mem::replace(&mut self.phase, Phase::NotOpen);
        if phase.state().is_opening() {
            self.complete_open(Completion::Cancelled);
        }

        match phase {
            Phase::OpeningTls(session) | Phase::Open(session) => session.shutdown(),
            other => drop(other),
        }

        let cancelled = self.queue.drain_with(Completion::Cancelled);
        self.callbacks = None;
        self.open_deadline = None;

        tracing::debug!(host = %self.config.host, cancelled, "closed");
    }
}

impl<C, D, S, T> Drop for Connection<C, D, S, T>
where
    C: Clock,
    D: DnsPrimitive,
    S: SocketPrimitive,
    T: TlsPrimitive<Socket = S::Socket>,
{
    fn drop(&mut self) {
        if !matches!(self.phase, Phase::NotOpen) {
            tracing::warn!(
                host = %self.config.host,
                state = ?self.state(),
                "connection dropped without close"
            );
            self.teardown();
        }
    }
}

impl<C, D, S, T> fmt::Debug for Connection<C, D, S, T>
where
    C: Clock,
    D: DnsPrimitive,
    S: SocketPrimitive,
    T: TlsPrimitive<Socket = S::Socket>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state())
            .field("pending_sends", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl<C, D, S, T> Transport for Connection<C, D, S, T>
where
    C: Clock,
    D: DnsPrimitive,
    S: SocketPrimitive,
    T: TlsPrimitive<Socket = S::Socket>,
{
    fn open(
        &mut self,
        on_open_complete: OnOpenComplete,
        on_bytes_received: OnBytesReceived,
        on_io_error: OnIoError,
    ) -> Result<()> {
        self.open_boxed(on_open_complete, on_bytes_received, on_io_error)
    }

    fn close(&mut self, on_close_complete: OnCloseComplete) -> Result<()> {
        self.close_boxed(on_close_complete)
    }

    fn send(&mut self, bytes: &[u8], on_send_complete: OnSendComplete) -> Result<()> {
        self.send_boxed(bytes, on_send_complete)
    }

    fn do_work(&mut self) {
        Connection::do_work(self);
    }

    fn set_option(&mut self, name: &str, value: OptionValue) -> Result<()> {
        Connection::set_option(self, name, value)
    }

    fn retrieve_options(&self) -> TransportOptions {
        Connection::retrieve_options(self)
    }
}
