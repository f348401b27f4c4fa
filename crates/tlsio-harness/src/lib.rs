//! Deterministic simulation harness for the TLS transport.
//!
//! This crate provides simulated implementations of the `tlsio-core`
//! collaborator traits (virtual clock, scripted DNS, sockets and TLS) plus
//! a scenario framework, enabling deterministic, reproducible testing of
//! the connection state machine under slow, failing and chunked networks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod scenario;
pub mod sim_env;
pub mod sim_transport;

use tlsio_core::{Collaborators, Connection, TlsIoConfig};

pub use sim_env::{SimClock, SimInstant};
pub use sim_transport::{ReadMode, ResourceStats, SimNetwork, TlsStep, WriteMode};

/// A connection wired to the simulation.
pub type SimConnection = Connection<SimClock, SimNetwork, SimNetwork, SimNetwork>;

/// Create a connection driven by `clock` and `net`.
///
/// # Errors
///
/// Returns the error from [`Connection::create`].
pub fn sim_connection(
    config: TlsIoConfig,
    clock: &SimClock,
    net: &SimNetwork,
) -> tlsio_core::Result<SimConnection> {
    let collaborators = Collaborators::new(clock.clone(), net.clone(), net.clone(), net.clone());
    Connection::create(config, collaborators)
}
