//! Connection configuration.

use std::time::Duration;

use crate::error::{Result, TlsIoError};

/// Window for the whole DNS → connect → handshake sequence.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(40);

/// Window for a single send once it reaches the head of the queue.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(40);

/// Bytes requested from the TLS session per `do_work` read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64;

/// Longest hostname accepted (RFC 1035 presentation form).
pub const MAX_HOST_LEN: usize = 255;

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsIoConfig {
    /// Hostname to resolve; also used as the TLS server name
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Deadline for reaching OPEN, armed once by `open`
    pub operation_timeout: Duration,
    /// Deadline for each send, armed when it becomes head-of-queue
    pub send_timeout: Duration,
    /// Maximum bytes read per poll
    pub read_chunk_size: usize,
}

impl TlsIoConfig {
    /// Configuration for `host:port` with default timeouts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }

    /// Override the open-sequence timeout.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Override the per-send timeout.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Override the read chunk size.
    #[must_use]
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Check the configuration before a connection is built from it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty, overlong or NUL-containing
    /// host, or a zero read chunk size.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(TlsIoError::InvalidArgument("host is empty".to_string()));
        }
        if self.host.len() > MAX_HOST_LEN {
            return Err(TlsIoError::InvalidArgument(format!(
                "host is {} bytes, maximum is {}",
                self.host.len(),
                MAX_HOST_LEN
            )));
        }
        if self.host.contains('\0') {
            return Err(TlsIoError::InvalidArgument("host contains NUL".to_string()));
        }
        if self.read_chunk_size == 0 {
            return Err(TlsIoError::InvalidArgument("read chunk size is zero".to_string()));
        }
        Ok(())
    }
}
