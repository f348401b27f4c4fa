//! TLS session over an opaque TLS capability.
//!
//! The primitive follows std I/O conventions: an `io::Error` of kind
//! `WouldBlock` (or `Interrupted`) means "poll again later", any other error
//! is a hard failure. [`TlsSession`] turns those raw results into
//! [`TlsOutcome`] so the state machine never inspects error kinds itself.

use std::io;

use crate::error::{Result, TlsIoError};

/// TLS capability: builds contexts and sessions and binds them to sockets.
pub trait TlsPrimitive {
    /// Connected socket handed over by the socket primitive.
    type Socket;

    /// Shared TLS configuration. Dropping it frees the context.
    type Context;

    /// One client session. Dropping it frees the session.
    type Session: TlsRecordIo;

    /// Create a client context.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS library cannot build a configuration.
    fn new_context(&mut self) -> Result<Self::Context>;

    /// Create a session for `server_name` from `context`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server name is unusable or the session cannot
    /// be allocated.
    fn new_session(&mut self, context: &Self::Context, server_name: &str)
    -> Result<Self::Session>;

    /// Attach a connected socket to `session`. The session takes ownership.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be used by the session.
    fn bind_socket(&mut self, session: &mut Self::Session, socket: Self::Socket) -> Result<()>;
}

/// Handshake and record-layer operations of a bound session.
///
/// None of these may block.
pub trait TlsRecordIo {
    /// Advance the handshake. `Ok(())` once the handshake is complete.
    fn handshake_step(&mut self) -> io::Result<()>;

    /// Read decrypted application data into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Encrypt and send a prefix of `buf`, returning how much was accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Send close_notify, best effort.
    fn shutdown(&mut self);
}

/// Classified result of a TLS call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsOutcome<T> {
    /// Call succeeded
    Done(T),
    /// Call needs more polling; not an error
    WouldBlock,
    /// Hard failure
    Failed(TlsIoError),
}

fn is_would_block(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

/// A TLS session bound to a connected socket, with its context.
pub struct TlsSession<T: TlsPrimitive> {
    // Declared before `_context` so the session is freed first.
    session: T::Session,
    _context: T::Context,
    server_name: String,
}

impl<T: TlsPrimitive> TlsSession<T> {
    /// Build context and session for `server_name`, then bind `socket`.
    ///
    /// Anything built before a failing step is freed before returning.
    ///
    /// # Errors
    ///
    /// Returns `Tls` naming the step that failed.
    pub fn establish(tls: &mut T, socket: T::Socket, server_name: &str) -> Result<Self> {
        let context = tls.new_context().map_err(|e| tls_step_error("create context", e))?;
        let mut session = tls
            .new_session(&context, server_name)
            .map_err(|e| tls_step_error("create session", e))?;
        tls.bind_socket(&mut session, socket).map_err(|e| tls_step_error("bind socket", e))?;

        Ok(Self { session, _context: context, server_name: server_name.to_string() })
    }

    /// Run one handshake step.
    pub fn handshake(&mut self) -> TlsOutcome<()> {
        match self.session.handshake_step() {
            Ok(()) => TlsOutcome::Done(()),
            Err(e) if is_would_block(&e) => TlsOutcome::WouldBlock,
            Err(e) => TlsOutcome::Failed(TlsIoError::Tls(format!(
                "handshake with {} failed: {}",
                self.server_name, e
            ))),
        }
    }

    /// Read at most `buf.len()` bytes of application data.
    ///
    /// An empty read is reported as `WouldBlock`.
    pub fn read(&mut self, buf: &mut [u8]) -> TlsOutcome<usize> {
        match self.session.read(buf) {
            Ok(0) => TlsOutcome::WouldBlock,
            Ok(n) => TlsOutcome::Done(n.min(buf.len())),
            Err(e) if is_would_block(&e) => TlsOutcome::WouldBlock,
            Err(e) => TlsOutcome::Failed(TlsIoError::Io(format!("read failed: {}", e))),
        }
    }

    /// Write a prefix of `buf`.
    ///
    /// Zero bytes accepted for a non-empty buffer is reported as
    /// `WouldBlock`.
    pub fn write(&mut self, buf: &[u8]) -> TlsOutcome<usize> {
        match self.session.write(buf) {
            Ok(0) if !buf.is_empty() => TlsOutcome::WouldBlock,
            Ok(n) => TlsOutcome::Done(n.min(buf.len())),
            Err(e) if is_would_block(&e) => TlsOutcome::WouldBlock,
            Err(e) => TlsOutcome::Failed(TlsIoError::Io(format!("write failed: {}", e))),
        }
    }

    /// Send close_notify and free the session and context.
    pub fn shutdown(mut self) {
        self.session.shutdown();
        tracing::trace!(server_name = %self.server_name, "tls session shut down");
    }

    /// Server name the session was created for.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

fn tls_step_error(step: &str, err: TlsIoError) -> TlsIoError {
    match err {
        TlsIoError::Tls(msg) => TlsIoError::Tls(format!("{step}: {msg}")),
        other => TlsIoError::Tls(format!("{step}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::VecDeque, rc::Rc};

    use super::*;

    #[derive(Default)]
    struct Script {
        handshake: VecDeque<io::Result<()>>,
        reads: VecDeque<io::Result<Vec<u8>>>,
        writes: VecDeque<io::Result<usize>>,
        shutdowns: u32,
        freed: Vec<&'static str>,
    }

    type Shared = Rc<RefCell<Script>>;

    struct Session(Shared);

    impl Drop for Session {
        fn drop(&mut self) {
            self.0.borrow_mut().freed.push("session");
        }
    }

    struct Context(Shared);

    impl Drop for Context {
        fn drop(&mut self) {
            self.0.borrow_mut().freed.push("context");
        }
    }

    impl TlsRecordIo for Session {
        fn handshake_step(&mut self) -> io::Result<()> {
            self.0.borrow_mut().handshake.pop_front().unwrap_or(Ok(()))
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.borrow_mut().reads.pop_front() {
                Some(Ok(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                },
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().writes.pop_front().unwrap_or(Ok(buf.len()))
        }

        fn shutdown(&mut self) {
            self.0.borrow_mut().shutdowns += 1;
        }
    }

    struct Primitive {
        shared: Shared,
        fail_bind: bool,
    }

    impl TlsPrimitive for Primitive {
        type Socket = ();
        type Context = Context;
        type Session = Session;

        fn new_context(&mut self) -> Result<Context> {
            Ok(Context(self.shared.clone()))
        }

        fn new_session(&mut self, _context: &Context, server_name: &str) -> Result<Session> {
            if server_name.is_empty() {
                return Err(TlsIoError::Tls("empty server name".to_string()));
            }
            Ok(Session(self.shared.clone()))
        }

        fn bind_socket(&mut self, _session: &mut Session, _socket: ()) -> Result<()> {
            if self.fail_bind { Err(TlsIoError::Io("bad fd".to_string())) } else { Ok(()) }
        }
    }

    fn establish(shared: &Shared) -> TlsSession<Primitive> {
        let mut tls = Primitive { shared: shared.clone(), fail_bind: false };
        TlsSession::establish(&mut tls, (), "example.test").unwrap()
    }

    #[test]
    fn handshake_outcomes_are_classified() {
        let shared = Shared::default();
        {
            let mut script = shared.borrow_mut();
            script.handshake.push_back(Err(io::ErrorKind::WouldBlock.into()));
            script.handshake.push_back(Err(io::ErrorKind::Interrupted.into()));
            script.handshake.push_back(Ok(()));
            script.handshake.push_back(Err(io::Error::other("bad record mac")));
        }
        let mut session = establish(&shared);

        assert_eq!(session.handshake(), TlsOutcome::WouldBlock);
        assert_eq!(session.handshake(), TlsOutcome::WouldBlock);
        assert_eq!(session.handshake(), TlsOutcome::Done(()));
        assert_eq!(session.server_name(), "example.test");
        let TlsOutcome::Failed(TlsIoError::Tls(msg)) = session.handshake() else {
            panic!("handshake failure not reported as a TLS error");
        };
        assert!(msg.contains("example.test"), "{msg}");
    }

    #[test]
    fn empty_read_is_would_block() {
        let shared = Shared::default();
        shared.borrow_mut().reads.push_back(Ok(Vec::new()));
        shared.borrow_mut().reads.push_back(Ok(b"hello".to_vec()));
        let mut session = establish(&shared);
        let mut buf = [0u8; 64];

        assert_eq!(session.read(&mut buf), TlsOutcome::WouldBlock);
        assert_eq!(session.read(&mut buf), TlsOutcome::Done(5));
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(session.read(&mut buf), TlsOutcome::WouldBlock);
    }

    #[test]
    fn zero_byte_write_is_would_block() {
        let shared = Shared::default();
        shared.borrow_mut().writes.push_back(Ok(0));
        shared.borrow_mut().writes.push_back(Err(io::ErrorKind::BrokenPipe.into()));
        let mut session = establish(&shared);

        assert_eq!(session.write(b"abc"), TlsOutcome::WouldBlock);
        assert!(matches!(session.write(b"abc"), TlsOutcome::Failed(TlsIoError::Io(_))));
        assert_eq!(session.write(b"abc"), TlsOutcome::Done(3));
    }

    #[test]
    fn shutdown_frees_session_before_context() {
        let shared = Shared::default();
        let session = establish(&shared);
        session.shutdown();

        let script = shared.borrow();
        assert_eq!(script.shutdowns, 1);
        assert_eq!(script.freed, vec!["session", "context"]);
    }

    #[test]
    fn failed_bind_frees_partial_state() {
        let shared = Shared::default();
        let mut tls = Primitive { shared: shared.clone(), fail_bind: true };
        let err = TlsSession::establish(&mut tls, (), "example.test").err().unwrap();

        assert!(matches!(err, TlsIoError::Tls(msg) if msg.starts_with("bind socket")));
        assert_eq!(shared.borrow().freed, vec!["session", "context"]);
    }

    #[test]
    fn failed_session_frees_context() {
        let shared = Shared::default();
        let mut tls = Primitive { shared: shared.clone(), fail_bind: false };
        let err = TlsSession::establish(&mut tls, (), "").err().unwrap();

        assert!(matches!(err, TlsIoError::Tls(msg) if msg.starts_with("create session")));
        assert_eq!(shared.borrow().freed, vec!["context"]);
    }
}
