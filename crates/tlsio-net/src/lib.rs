//! Production collaborators for the TLS transport
//!
//! `tlsio-core` reaches the outside world only through traits. This crate
//! implements them against the real platform:
//!
//! - [`clock::SystemClock`]: `std::time::Instant`
//! - [`dns::ThreadedDns`]: blocking `getaddrinfo` on a helper thread, polled
//!   through a channel
//! - [`connector::NonBlockingConnector`]: `socket2` sockets with a
//!   non-blocking connect
//! - [`tls::RustlsTls`]: rustls client sessions pumped over the socket
//!
//! [`connection`] wires them together into a ready-to-use [`NetConnection`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod clock;
pub mod connector;
pub mod dns;
pub mod error;
pub mod tls;

use tlsio_core::{Collaborators, Connection, TlsIoConfig};

pub use crate::{
    clock::SystemClock,
    connector::{ConnectorConfig, NonBlockingConnector},
    dns::ThreadedDns,
    error::NetError,
    tls::{RustlsConfig, RustlsTls},
};

/// A connection backed by the real network.
pub type NetConnection = Connection<SystemClock, ThreadedDns, NonBlockingConnector, RustlsTls>;

/// Create a connection to `config.host:config.port` over the real network.
///
/// # Errors
///
/// Returns the error from [`Connection::create`].
pub fn connection(
    config: TlsIoConfig,
    tls: RustlsConfig,
    connector: ConnectorConfig,
) -> tlsio_core::Result<NetConnection> {
    let collaborators = Collaborators::new(
        SystemClock,
        ThreadedDns::new(),
        NonBlockingConnector::new(connector),
        RustlsTls::new(tls),
    );
    Connection::create(config, collaborators)
}
