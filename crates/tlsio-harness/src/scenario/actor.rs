//! Actor wrappers for scenario execution.
//!
//! The client actor wraps the connection and turns every callback into an
//! [`Event`]. The peer actor is the far end of the simulated network.

use std::{cell::RefCell, rc::Rc};

use tlsio_core::{Completion, ConnectionState, TlsIoError};

use crate::{SimConnection, SimNetwork};

/// A callback observed during a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `on_open_complete` fired
    OpenComplete(Completion),
    /// `on_bytes_received` fired with these bytes
    BytesReceived(Vec<u8>),
    /// `on_io_error` fired
    IoError(TlsIoError),
    /// `on_send_complete` fired for the send with this id
    SendComplete {
        /// Id returned by [`ClientActor::send`]
        id: usize,
        /// Completion result
        result: Completion,
    },
    /// `on_close_complete` fired
    CloseComplete,
}

type EventLog = Rc<RefCell<Vec<Event>>>;

/// Client actor: a connection plus the log of its callbacks.
pub struct ClientActor {
    name: String,
    connection: SimConnection,
    events: EventLog,
    next_send_id: usize,
}

impl ClientActor {
    /// Create a new client actor.
    pub fn new(name: String, connection: SimConnection) -> Self {
        Self { name, connection, events: EventLog::default(), next_send_id: 0 }
    }

    /// Open the connection, logging its callbacks.
    ///
    /// # Errors
    ///
    /// Returns the connection's error if `open` was rejected.
    pub fn open(&mut self) -> tlsio_core::Result<()> {
        let (opened, received, failed) =
            (self.events.clone(), self.events.clone(), self.events.clone());
        self.connection.open(
            move |result| opened.borrow_mut().push(Event::OpenComplete(result)),
            move |bytes| received.borrow_mut().push(Event::BytesReceived(bytes.to_vec())),
            move |err| failed.borrow_mut().push(Event::IoError(err.clone())),
        )
    }

    /// Queue `bytes`, returning the id its completion will be logged under.
    ///
    /// # Errors
    ///
    /// Returns the connection's error if `send` was rejected.
    pub fn send(&mut self, bytes: &[u8]) -> tlsio_core::Result<usize> {
        let id = self.next_send_id;
        let events = self.events.clone();
        self.connection
            .send(bytes, move |result| events.borrow_mut().push(Event::SendComplete { id, result }))?;
        self.next_send_id += 1;
        Ok(id)
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns the connection's error if it was not open.
    pub fn close(&mut self) -> tlsio_core::Result<()> {
        let events = self.events.clone();
        self.connection.close(move || events.borrow_mut().push(Event::CloseComplete))
    }

    /// Run one `do_work`.
    pub fn poll(&mut self) {
        self.connection.do_work();
    }

    /// Poll until the connection reaches `target`, at most `max_polls` times.
    ///
    /// Returns the number of polls taken.
    pub fn poll_until(&mut self, target: ConnectionState, max_polls: usize) -> Result<usize, String> {
        for polls in 0..=max_polls {
            if self.connection.state() == target {
                return Ok(polls);
            }
            if polls < max_polls {
                self.poll();
            }
        }
        Err(format!(
            "Client {} did not reach {:?} within {} polls, stuck in {:?}",
            self.name,
            target,
            max_polls,
            self.connection.state()
        ))
    }

    /// Expect that the connection is in `expected`.
    pub fn expect_state(&self, expected: ConnectionState) -> Result<(), String> {
        if self.connection.state() != expected {
            Err(format!(
                "Client {} expected {:?}, got {:?}",
                self.name,
                expected,
                self.connection.state()
            ))
        } else {
            Ok(())
        }
    }

    /// Get the underlying connection (for oracle access).
    pub fn connection(&self) -> &SimConnection {
        &self.connection
    }

    /// Every callback observed so far, in firing order.
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Get actor name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Peer actor: the far end of the simulated network.
#[derive(Clone)]
pub struct PeerActor {
    name: String,
    net: SimNetwork,
}

impl PeerActor {
    /// Create a new peer actor.
    pub fn new(name: String, net: SimNetwork) -> Self {
        Self { name, net }
    }

    /// Send application data to the client.
    pub fn deliver(&self, bytes: &[u8]) {
        self.net.deliver(bytes);
    }

    /// Everything the client has written so far.
    pub fn received(&self) -> Vec<u8> {
        self.net.written()
    }

    /// The network script, for steering faults and reading stats.
    pub fn network(&self) -> &SimNetwork {
        &self.net
    }

    /// Get actor name.
    pub fn name(&self) -> &str {
        &self.name
    }
}
