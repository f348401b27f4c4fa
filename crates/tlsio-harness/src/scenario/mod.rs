//! Scenario testing framework for deterministic simulation tests.
//!
//! This module provides a declarative API for writing scenario-based tests
//! that follow the Oracle Pattern. A scenario scripts the network, drives
//! the connection step by step on virtual time, records every callback, and
//! refuses to run without an oracle that checks the result.

mod actor;
mod builder;
pub mod oracle;
mod world;

pub use actor::{ClientActor, Event, PeerActor};
pub use builder::{RunnableScenario, Scenario};
pub use oracle::OracleFn;
pub use world::World;
