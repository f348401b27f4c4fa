//! Error types for the TLS transport core.
//!
//! Errors fall into the taxonomy the state machine reports:
//! - Argument and state errors (returned synchronously, never change state)
//! - Allocation errors (returned synchronously, nothing left half-built)
//! - Timeouts (open sequence or a single queued send)
//! - Hard failures from DNS, connect, TLS or record I/O
//!
//! Would-block outcomes are never errors; they leave the machine waiting for
//! the next poll.

use std::{io, time::Duration};

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors produced by the connection state machine and its collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TlsIoError {
    /// A public operation received an unusable argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation is not valid in the current state
    #[error("invalid state: cannot {operation} while {state:?}")]
    InvalidState {
        /// State when the operation was attempted
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Buffer or queue entry could not be allocated
    #[error("allocation of {size} bytes failed")]
    Allocation {
        /// Requested size in bytes
        size: usize,
    },

    /// The open sequence did not reach OPEN before its deadline
    #[error("open timed out in {state:?} after {elapsed:?}")]
    OpenTimeout {
        /// Opening sub-state that was active when the deadline passed
        state: ConnectionState,
        /// Time since `open` was called
        elapsed: Duration,
    },

    /// A queued send stayed at the head of the queue past its deadline
    #[error("send timed out after {elapsed:?} with {unsent} bytes unsent")]
    SendTimeout {
        /// Time since the send became head-of-queue
        elapsed: Duration,
        /// Bytes still unsent
        unsent: usize,
    },

    /// Hostname resolution failed
    #[error("dns error: {0}")]
    Dns(String),

    /// TCP connect failed
    #[error("connect error: {0}")]
    Connect(String),

    /// TLS context, session or handshake failed
    #[error("tls error: {0}")]
    Tls(String),

    /// Record-layer read or write failed
    #[error("io error: {0}")]
    Io(String),
}

/// Convenient Result alias for transport operations
pub type Result<T> = std::result::Result<T, TlsIoError>;

impl TlsIoError {
    /// Returns true if this error is transient and may succeed on a fresh
    /// open/close cycle.
    ///
    /// The state machine itself never retries; this classification is for
    /// callers deciding whether to reconnect.
    pub fn is_transient(&self) -> bool {
        matches!(self, TlsIoError::OpenTimeout { .. } | TlsIoError::SendTimeout { .. })
    }
}

/// Convert TlsIoError to io::Error for callers that speak std I/O.
impl From<TlsIoError> for io::Error {
    fn from(err: TlsIoError) -> Self {
        let kind = match &err {
            TlsIoError::OpenTimeout { .. } | TlsIoError::SendTimeout { .. } => {
                io::ErrorKind::TimedOut
            },
            TlsIoError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            TlsIoError::InvalidState { .. } => io::ErrorKind::NotConnected,
            TlsIoError::Allocation { .. } => io::ErrorKind::OutOfMemory,
            TlsIoError::Connect(_) => io::ErrorKind::ConnectionRefused,
            TlsIoError::Tls(_) => io::ErrorKind::InvalidData,
            TlsIoError::Dns(_) | TlsIoError::Io(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err.to_string())
    }
}

/// Convert io::Error to TlsIoError (record-layer failures)
impl From<io::Error> for TlsIoError {
    fn from(err: io::Error) -> Self {
        TlsIoError::Io(err.to_string())
    }
}
