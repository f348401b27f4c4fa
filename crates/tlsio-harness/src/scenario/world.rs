//! World state for scenario execution.
//!
//! The World owns one client connection, the simulated peer and the virtual
//! clock, records the state after every poll and rejected operations, and
//! provides oracle verification helpers.

use std::time::Duration;

use tlsio_core::{Completion, ConnectionState, TlsIoConfig, TlsIoError};

use crate::{
    ResourceStats, SimClock, SimNetwork,
    scenario::{ClientActor, Event, PeerActor},
    sim_connection,
};

/// World state containing one client, its peer and the clock.
pub struct World {
    client: ClientActor,
    peer: PeerActor,
    clock: SimClock,
    states: Vec<ConnectionState>,
    rejections: Vec<(&'static str, TlsIoError)>,
}

impl World {
    /// Create a world with a fresh clock and the given network.
    pub(crate) fn new(config: TlsIoConfig, net: SimNetwork) -> Result<Self, String> {
        let clock = SimClock::new();
        let connection = sim_connection(config, &clock, &net)
            .map_err(|e| format!("connection create failed: {}", e))?;
        let client = ClientActor::new("client".to_string(), connection);
        let states = vec![client.connection().state()];

        Ok(Self {
            client,
            peer: PeerActor::new("peer".to_string(), net),
            clock,
            states,
            rejections: Vec::new(),
        })
    }

    /// Get the client.
    pub fn client(&self) -> &ClientActor {
        &self.client
    }

    /// Get mutable client.
    pub(crate) fn client_mut(&mut self) -> &mut ClientActor {
        &mut self.client
    }

    /// Get the peer.
    pub fn peer(&self) -> &PeerActor {
        &self.peer
    }

    /// Poll the client once and record the resulting state.
    pub(crate) fn poll(&mut self) {
        self.client.poll();
        self.states.push(self.client.connection().state());
    }

    /// Advance virtual time.
    pub(crate) fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Record an operation the connection rejected.
    pub(crate) fn record_rejection(&mut self, operation: &'static str, error: TlsIoError) {
        self.rejections.push((operation, error));
    }

    /// Current client state.
    pub fn state(&self) -> ConnectionState {
        self.client.connection().state()
    }

    /// State at creation followed by the state after every poll.
    pub fn state_trace(&self) -> &[ConnectionState] {
        &self.states
    }

    /// Operations rejected with an error, in order.
    pub fn rejections(&self) -> &[(&'static str, TlsIoError)] {
        &self.rejections
    }

    /// Virtual time elapsed since the world was created.
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Every callback the client observed.
    pub fn events(&self) -> Vec<Event> {
        self.client.events()
    }

    /// Results passed to `on_open_complete`, in order.
    pub fn open_completions(&self) -> Vec<Completion> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::OpenComplete(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    /// `(send id, result)` for every send completion, in firing order.
    pub fn send_completions(&self) -> Vec<(usize, Completion)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::SendComplete { id, result } => Some((id, result)),
                _ => None,
            })
            .collect()
    }

    /// Errors passed to `on_io_error`, in order.
    pub fn io_errors(&self) -> Vec<TlsIoError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::IoError(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    /// All bytes delivered to `on_bytes_received`, concatenated.
    pub fn client_received(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::BytesReceived(bytes) => Some(bytes),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Number of times `on_close_complete` fired.
    pub fn close_completions(&self) -> usize {
        self.events().iter().filter(|e| matches!(e, Event::CloseComplete)).count()
    }

    /// Resource creation and release counts.
    pub fn resources(&self) -> ResourceStats {
        self.peer.network().stats()
    }
}
