//! Uniform transport surface.
//!
//! Every transport adapter (TLS over TCP here; serial links or proxy tunnels
//! elsewhere) exposes the same poll-driven operations, so the layer above can
//! hold a `Box<dyn Transport>` and never care which one it drives.
//!
//! # Lifecycle
//!
//! ```text
//! open(on_open_complete, on_bytes_received, on_io_error)
//!   ↓
//! do_work() ... do_work()      ← caller-controlled cadence
//!   ↓                           on_open_complete(Ok | Error)
//! send(bytes, on_send_complete)
//!   ↓
//! do_work() ... do_work()      ← on_bytes_received, on_send_complete
//!   ↓
//! close(on_close_complete)     ← pending sends complete with Cancelled
//! ```

use crate::{
    completion::{OnBytesReceived, OnCloseComplete, OnIoError, OnOpenComplete, OnSendComplete},
    error::Result,
    options::{OptionValue, TransportOptions},
};

/// Poll-driven, callback-completing byte transport.
///
/// All methods return immediately. Callbacks run inline on the caller's
/// thread and must not call back into the same transport.
pub trait Transport {
    /// Begin opening the transport.
    ///
    /// `on_open_complete` fires exactly once per call: immediately with
    /// `Error` if this returns `Err`, otherwise from a later `do_work` or
    /// `close`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the transport is not closed, or the error
    /// that prevented the open from starting.
    fn open(
        &mut self,
        on_open_complete: OnOpenComplete,
        on_bytes_received: OnBytesReceived,
        on_io_error: OnIoError,
    ) -> Result<()>;

    /// Tear down the transport. `on_close_complete` always fires.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if there was nothing to close.
    fn close(&mut self, on_close_complete: OnCloseComplete) -> Result<()>;

    /// Queue `bytes` for transmission.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless open, or `Allocation` if the copy
    /// failed. `on_send_complete` does not fire on error.
    fn send(&mut self, bytes: &[u8], on_send_complete: OnSendComplete) -> Result<()>;

    /// Perform at most one unit of work.
    fn do_work(&mut self);

    /// Set a transport-specific option.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unusable option name.
    fn set_option(&mut self, name: &str, value: OptionValue) -> Result<()>;

    /// Snapshot the options that would recreate this transport's settings.
    fn retrieve_options(&self) -> TransportOptions;
}
