//! TLS sessions with rustls.
//!
//! rustls is sans-IO: the session only moves bytes between its buffers and
//! whatever reader or writer it is handed. Every operation here pumps the
//! non-blocking socket once in each direction it needs, so a call never
//! waits on the network.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
    sync::Arc,
};

use rustls::{
    ClientConfig, ClientConnection, RootCertStore,
    pki_types::{CertificateDer, ServerName},
};
use tlsio_core::{
    TlsIoError,
    tls::{TlsPrimitive, TlsRecordIo},
};

use crate::{connector::ConnectingSocket, error::NetError};

/// Plaintext accepted by one `write` call.
///
/// One TLS record's worth. Larger sends complete over several polls.
pub const MAX_PLAINTEXT_PER_WRITE: usize = 16 * 1024;

/// Client TLS settings.
#[derive(Debug, Clone, Default)]
pub struct RustlsConfig {
    /// ALPN protocols to offer, most preferred first
    pub alpn_protocols: Vec<Vec<u8>>,
    /// Trust anchors added to the bundled web PKI roots
    pub extra_roots: Vec<CertificateDer<'static>>,
}

impl RustlsConfig {
    /// Offer `protocols` via ALPN.
    #[must_use]
    pub fn with_alpn(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    /// Trust `cert` in addition to the web PKI roots.
    #[must_use]
    pub fn with_root(mut self, cert: CertificateDer<'static>) -> Self {
        self.extra_roots.push(cert);
        self
    }

    /// Build the rustls client configuration.
    ///
    /// # Errors
    ///
    /// Returns `Rustls` if a root certificate is rejected or the protocol
    /// versions cannot be configured.
    pub fn build(&self) -> Result<ClientConfig, NetError> {
        let mut roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        for cert in &self.extra_roots {
            roots.add(cert.clone())?;
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = self.alpn_protocols.clone();

        Ok(config)
    }
}

/// TLS primitive backed by rustls.
#[derive(Debug, Clone, Default)]
pub struct RustlsTls {
    config: RustlsConfig,
}

impl RustlsTls {
    /// Create a primitive building sessions from `config`.
    pub fn new(config: RustlsConfig) -> Self {
        Self { config }
    }
}

impl TlsPrimitive for RustlsTls {
    type Socket = ConnectingSocket;
    type Context = Arc<ClientConfig>;
    type Session = RustlsSession;

    fn new_context(&mut self) -> tlsio_core::Result<Arc<ClientConfig>> {
        Ok(Arc::new(self.config.build()?))
    }

    fn new_session(
        &mut self,
        context: &Arc<ClientConfig>,
        server_name: &str,
    ) -> tlsio_core::Result<RustlsSession> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| NetError::InvalidServerName(server_name.to_string()))?;
        let conn = ClientConnection::new(context.clone(), name).map_err(NetError::from)?;

        Ok(RustlsSession { conn, stream: None })
    }

    fn bind_socket(
        &mut self,
        session: &mut RustlsSession,
        socket: ConnectingSocket,
    ) -> tlsio_core::Result<()> {
        if session.stream.is_some() {
            return Err(TlsIoError::Tls("session already bound to a socket".to_string()));
        }
        session.stream = Some(socket.into_stream());
        Ok(())
    }
}

/// A rustls client session over a non-blocking TCP stream.
pub struct RustlsSession {
    conn: ClientConnection,
    stream: Option<TcpStream>,
}

impl std::fmt::Debug for RustlsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustlsSession")
            .field("handshaking", &self.conn.is_handshaking())
            .field("bound", &self.stream.is_some())
            .finish()
    }
}

fn would_block() -> io::Error {
    io::ErrorKind::WouldBlock.into()
}

fn not_bound() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "no socket bound")
}

impl RustlsSession {
    /// Write buffered TLS records to the socket. `Ok(false)` if the socket
    /// filled up before the buffer drained.
    fn flush(&mut self) -> io::Result<bool> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(not_bound());
        };

        while self.conn.wants_write() {
            match self.conn.write_tls(stream) {
                Ok(0) => return Ok(false),
                Ok(_) => {},
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Read once from the socket and process what arrived.
    fn fill(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(not_bound());
        };

        match self.conn.read_tls(stream) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed the socket"));
            },
            Ok(_) => {},
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e),
        }

        if let Err(e) = self.conn.process_new_packets() {
            // Best effort: let the peer see the alert.
            let _ = self.flush();
            return Err(io::Error::new(io::ErrorKind::InvalidData, e));
        }
        Ok(())
    }
}

impl TlsRecordIo for RustlsSession {
    fn handshake_step(&mut self) -> io::Result<()> {
        self.flush()?;
        if self.conn.is_handshaking() && self.conn.wants_read() {
            self.fill()?;
            self.flush()?;
        }

        if self.conn.is_handshaking() || self.conn.wants_write() {
            Err(would_block())
        } else {
            Ok(())
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Records left over from an earlier write go out on every poll, even
        // when nothing new is queued. A full socket is not an error here.
        self.flush()?;
        if self.conn.wants_read() {
            self.fill()?;
            self.flush()?;
        }

        match self.conn.reader().read(buf) {
            Ok(0) if !buf.is_empty() => {
                Err(io::Error::new(io::ErrorKind::ConnectionAborted, "peer sent close_notify"))
            },
            other => other,
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Backpressure: accept nothing new until earlier records are out.
        if !self.flush()? {
            return Err(would_block());
        }

        let take = buf.len().min(MAX_PLAINTEXT_PER_WRITE);
        let accepted = self.conn.writer().write(&buf[..take])?;
        // Whatever does not fit now is flushed by the next read or write.
        self.flush()?;
        Ok(accepted)
    }

    fn shutdown(&mut self) {
        self.conn.send_close_notify();
        let _ = self.flush();
        if let Some(stream) = self.stream.as_ref() {
            let _ = stream.shutdown(Shutdown::Write);
        }
    }
}
