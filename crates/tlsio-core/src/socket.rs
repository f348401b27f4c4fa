//! Non-blocking TCP connect behind a polling interface.

use std::{io, net::SocketAddrV4};

use crate::error::{Result, TlsIoError};

/// Asynchronous socket connect capability.
pub trait SocketPrimitive {
    /// Handle for one socket. Dropping it closes the socket.
    type Socket: PendingSocket;

    /// Start connecting to `addr` without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if no socket could be created or the connect was
    /// rejected immediately.
    fn begin_connect(&mut self, addr: SocketAddrV4) -> Result<Self::Socket>;
}

/// A socket whose connect may still be in flight.
pub trait PendingSocket {
    /// Poll connect progress.
    ///
    /// Returns `Ok(true)` once connected, `Ok(false)` while still in
    /// progress, and `Err` if the connect failed. Must never block.
    fn poll_connect(&mut self) -> io::Result<bool>;
}

/// Result of polling an [`Establishment`].
#[derive(Debug)]
pub enum ConnectPoll<S> {
    /// Connect still in flight; the socket stays with the establishment
    Pending,
    /// Connected; ownership of the socket moves to the caller
    Connected(S),
    /// Connect failed; the socket has already been closed
    Failed(TlsIoError),
}

/// Owns one connecting socket and reports its progress.
pub struct Establishment<S> {
    addr: SocketAddrV4,
    socket: Option<S>,
}

impl<S: PendingSocket> Establishment<S> {
    /// Start connecting to `addr` with `sockets`.
    ///
    /// # Errors
    ///
    /// Returns `Connect` if the primitive could not start the connect.
    pub fn begin<P>(sockets: &mut P, addr: SocketAddrV4) -> Result<Self>
    where
        P: SocketPrimitive<Socket = S>,
    {
        let socket = sockets.begin_connect(addr).map_err(|e| match e {
            TlsIoError::Connect(_) => e,
            other => TlsIoError::Connect(other.to_string()),
        })?;

        tracing::trace!(%addr, "tcp connect started");
        Ok(Self { addr, socket: Some(socket) })
    }

    /// Poll the connect once.
    ///
    /// After `Connected` or `Failed` is returned the establishment is spent
    /// and further polls report `Failed`.
    pub fn poll(&mut self) -> ConnectPoll<S> {
        let Some(socket) = self.socket.as_mut() else {
            return ConnectPoll::Failed(TlsIoError::Connect("socket already taken".to_string()));
        };

        match socket.poll_connect() {
            Ok(false) => ConnectPoll::Pending,
            Ok(true) => match self.socket.take() {
                Some(socket) => ConnectPoll::Connected(socket),
                None => ConnectPoll::Pending,
            },
            Err(e) => {
                self.socket = None;
                ConnectPoll::Failed(TlsIoError::Connect(format!("{}: {}", self.addr, e)))
            },
        }
    }

    /// Address being connected to.
    #[must_use]
    pub fn addr(&self) -> SocketAddrV4 {
        self.addr
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[derive(Debug)]
    struct Scripted {
        outcomes: Vec<io::Result<bool>>,
    }

    impl PendingSocket for Scripted {
        fn poll_connect(&mut self) -> io::Result<bool> {
            if self.outcomes.is_empty() { Ok(false) } else { self.outcomes.remove(0) }
        }
    }

    struct Factory(Option<Vec<io::Result<bool>>>);

    impl SocketPrimitive for Factory {
        type Socket = Scripted;

        fn begin_connect(&mut self, _addr: SocketAddrV4) -> Result<Scripted> {
            match self.0.take() {
                Some(outcomes) => Ok(Scripted { outcomes }),
                None => Err(TlsIoError::Io("no sockets left".to_string())),
            }
        }
    }

    fn addr() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 443)
    }

    #[test]
    fn connected_hands_over_socket() {
        let mut sockets = Factory(Some(vec![Ok(false), Ok(true)]));
        let mut est = Establishment::begin(&mut sockets, addr()).unwrap();

        assert!(matches!(est.poll(), ConnectPoll::Pending));
        assert!(matches!(est.poll(), ConnectPoll::Connected(_)));
        assert!(matches!(est.poll(), ConnectPoll::Failed(_)));
    }

    #[test]
    fn refused_connect_fails() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let mut sockets = Factory(Some(vec![Err(refused)]));
        let mut est = Establishment::begin(&mut sockets, addr()).unwrap();

        match est.poll() {
            ConnectPoll::Failed(TlsIoError::Connect(msg)) => assert!(msg.contains("refused")),
            other => panic!("expected connect failure, got {:?}", other),
        }
    }

    #[test]
    fn begin_failure_maps_to_connect_error() {
        let mut sockets = Factory(None);
        let err = Establishment::begin(&mut sockets, addr()).err().unwrap();
        assert!(matches!(err, TlsIoError::Connect(_)));
    }
}
