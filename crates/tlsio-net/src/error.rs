//! Errors from the platform collaborators.

use std::io;

use thiserror::Error;
use tlsio_core::TlsIoError;

/// Failures inside the network collaborators.
///
/// These surface to the state machine as [`TlsIoError`] through the `From`
/// impl below; the state machine decides which phase they fail.
#[derive(Error, Debug)]
pub enum NetError {
    /// Operating system I/O error
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// rustls rejected the configuration or the peer
    #[error("rustls: {0}")]
    Rustls(#[from] rustls::Error),

    /// Hostname cannot be used as a TLS server name
    #[error("invalid server name {0:?}")]
    InvalidServerName(String),

    /// The resolver thread could not be started
    #[error("resolver thread: {0}")]
    ResolverThread(io::Error),
}

impl From<NetError> for TlsIoError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Io(e) => TlsIoError::Io(e.to_string()),
            NetError::Rustls(e) => TlsIoError::Tls(e.to_string()),
            NetError::InvalidServerName(name) => {
                TlsIoError::InvalidArgument(format!("invalid server name {name:?}"))
            },
            NetError::ResolverThread(e) => TlsIoError::Dns(e.to_string()),
        }
    }
}
