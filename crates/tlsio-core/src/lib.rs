//! Poll-driven TLS client transport
//!
//! This crate contains the connection state machine for a TLS-over-TCP client
//! transport that never blocks. It is completely decoupled from the platform:
//! DNS, sockets, TLS and time are reached only through traits, enabling
//! deterministic testing against simulated collaborators.
//!
//! # Architecture
//!
//! ```text
//!      ┌──────────────────────────────┐
//!      │ tlsio-core                   │
//!      │ - Connection state machine   │
//!      │ - Send queue and deadlines   │
//!      │ - Collaborator traits        │
//!      └──────────────────────────────┘
//!         ↓                      ↓
//! ┌────────────────┐  ┌──────────────────┐
//! │ tlsio-harness  │  │ tlsio-net        │
//! │ - Virtual time │  │ - System clock   │
//! │ - Seeded RNG   │  │ - Threaded DNS   │
//! │ - Fault inject │  │ - socket2/rustls │
//! └────────────────┘  └──────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - No I/O in Core: never call `std::time::Instant::now()`, open sockets or
//!   touch a TLS library directly
//! - Collaborator Traits: all side effects go through [`env::Clock`],
//!   [`resolver::DnsPrimitive`], [`socket::SocketPrimitive`] and
//!   [`tls::TlsPrimitive`]
//! - One Step Per Poll: [`connection::Connection::do_work`] performs at most
//!   one transition, so callers control latency and fairness
//!
//! # Modules
//!
//! - [`connection`]: Connection state machine (open, send, close, do_work)
//! - [`config`]: Connection configuration and defaults
//! - [`send_queue`]: FIFO of pending sends
//! - [`resolver`], [`socket`], [`tls`]: Collaborator traits and adapters
//! - [`env`]: Clock abstraction
//! - [`timeout`]: Deadline arithmetic
//! - [`transport`]: Uniform transport trait
//! - [`error`]: Error taxonomy

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod completion;
pub mod config;
pub mod connection;
pub mod env;
pub mod error;
pub mod options;
pub mod resolver;
pub mod send_queue;
pub mod socket;
pub mod timeout;
pub mod tls;
pub mod transport;

pub use completion::Completion;
pub use config::TlsIoConfig;
pub use connection::{Collaborators, Connection, ConnectionState};
pub use error::{Result, TlsIoError};
pub use transport::Transport;
