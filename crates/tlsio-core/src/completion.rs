//! Completion results and the callback types that carry them.
//!
//! Every asynchronous operation reports back through a callback supplied by
//! the caller. Callbacks run synchronously, inline in the `open`, `close`,
//! `send` or `do_work` call that triggers them.

use crate::error::TlsIoError;

/// Outcome passed to open and send completion callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion {
    /// The operation finished successfully
    Ok,
    /// The operation failed (hard failure or timeout)
    Error,
    /// The operation was abandoned by `close` or by dropping the connection
    Cancelled,
}

impl Completion {
    /// Whether this is a success result.
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Completion::Ok)
    }
}

/// Fired exactly once per open attempt.
pub type OnOpenComplete = Box<dyn FnOnce(Completion)>;

/// Fired with each chunk of decrypted application data.
pub type OnBytesReceived = Box<dyn FnMut(&[u8])>;

/// Fired when the open connection hits an I/O failure or a send timeout.
pub type OnIoError = Box<dyn FnMut(&TlsIoError)>;

/// Fired exactly once per queued send.
pub type OnSendComplete = Box<dyn FnOnce(Completion)>;

/// Fired when `close` finishes tearing down.
pub type OnCloseComplete = Box<dyn FnOnce()>;
