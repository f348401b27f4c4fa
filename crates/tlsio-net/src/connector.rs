//! Non-blocking TCP connect with socket2.
//!
//! The socket is switched to non-blocking before `connect`, so the call
//! returns `EINPROGRESS` instead of waiting. Completion is detected by
//! polling: a pending socket error means the connect failed, a peer address
//! means it succeeded, `ENOTCONN` means it is still in flight.

use std::{
    io,
    net::{SocketAddrV4, TcpStream},
};

use socket2::{Domain, Protocol, Socket, Type};
use tlsio_core::{
    TlsIoError,
    socket::{PendingSocket, SocketPrimitive},
};

/// Socket options applied to every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

/// Socket primitive that connects without blocking.
#[derive(Debug, Clone, Default)]
pub struct NonBlockingConnector {
    config: ConnectorConfig,
}

impl NonBlockingConnector {
    /// Create a connector applying `config` to each socket.
    pub fn new(config: ConnectorConfig) -> Self {
        Self { config }
    }

    fn start(&self, addr: SocketAddrV4) -> io::Result<ConnectingSocket> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;

        let connected = match socket.connect(&addr.into()) {
            Ok(()) => true,
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => false,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(e) => return Err(e),
        };

        let stream: TcpStream = socket.into();
        stream.set_nodelay(self.config.nodelay)?;
        Ok(ConnectingSocket { stream, connected })
    }
}

impl SocketPrimitive for NonBlockingConnector {
    type Socket = ConnectingSocket;

    fn begin_connect(&mut self, addr: SocketAddrV4) -> tlsio_core::Result<ConnectingSocket> {
        self.start(addr).map_err(|e| TlsIoError::Connect(format!("{addr}: {e}")))
    }
}

/// A non-blocking TCP socket whose connect may still be in flight.
#[derive(Debug)]
pub struct ConnectingSocket {
    stream: TcpStream,
    connected: bool,
}

impl ConnectingSocket {
    /// The underlying stream. Still non-blocking.
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

impl PendingSocket for ConnectingSocket {
    fn poll_connect(&mut self) -> io::Result<bool> {
        if self.connected {
            return Ok(true);
        }

        if let Some(err) = self.stream.take_error()? {
            return Err(err);
        }

        match self.stream.peer_addr() {
            Ok(_) => {
                self.connected = true;
                Ok(true)
            },
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(e) => Err(e),
        }
    }
}
