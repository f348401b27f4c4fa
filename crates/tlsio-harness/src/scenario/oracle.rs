//! Oracle functions for scenario verification.
//!
//! Oracle functions run at the end of scenarios to verify global consistency.
//! They receive a snapshot of the entire world state and assert invariants.

use tlsio_core::{Completion, ConnectionState};

use crate::scenario::World;

/// Oracle function type.
///
/// Receives immutable reference to world state and returns:
/// - `Ok(())` if all invariants hold
/// - `Err(message)` if verification fails
pub type OracleFn = Box<dyn FnOnce(&World) -> Result<(), String>>;

/// Create an oracle that verifies the client ended in `expected`.
pub fn state_is(expected: ConnectionState) -> OracleFn {
    Box::new(move |world| world.client().expect_state(expected))
}

/// Create an oracle that verifies `on_open_complete` fired exactly once,
/// with `expected`.
pub fn opened_with(expected: Completion) -> OracleFn {
    Box::new(move |world| {
        let completions = world.open_completions();
        if completions == [expected] {
            Ok(())
        } else {
            Err(format!("expected one open completion {:?}, got {:?}", expected, completions))
        }
    })
}

/// Create an oracle that verifies send results in firing order.
///
/// Sends must complete in the order they were queued.
pub fn sends_completed(expected: Vec<Completion>) -> OracleFn {
    Box::new(move |world| {
        let completions = world.send_completions();
        let ids: Vec<usize> = completions.iter().map(|(id, _)| *id).collect();
        if ids != (0..ids.len()).collect::<Vec<_>>() {
            return Err(format!("sends completed out of order: {:?}", ids));
        }

        let results: Vec<Completion> = completions.into_iter().map(|(_, r)| r).collect();
        if results == expected {
            Ok(())
        } else {
            Err(format!("expected send results {:?}, got {:?}", expected, results))
        }
    })
}

/// Create an oracle that verifies the peer received exactly `expected`.
pub fn peer_received(expected: Vec<u8>) -> OracleFn {
    Box::new(move |world| {
        let received = world.peer().received();
        if received == expected {
            Ok(())
        } else {
            Err(format!(
                "peer received {} bytes, expected {}: {:?}",
                received.len(),
                expected.len(),
                String::from_utf8_lossy(&received)
            ))
        }
    })
}

/// Create an oracle that verifies the client was handed exactly `expected`.
pub fn client_received(expected: Vec<u8>) -> OracleFn {
    Box::new(move |world| {
        let received = world.client_received();
        if received == expected {
            Ok(())
        } else {
            Err(format!(
                "client received {:?}, expected {:?}",
                String::from_utf8_lossy(&received),
                String::from_utf8_lossy(&expected)
            ))
        }
    })
}

/// Create an oracle that verifies every DNS lookup, socket, TLS context and
/// session created so far has been released exactly once.
pub fn resources_released() -> OracleFn {
    Box::new(|world| {
        let stats = world.resources();
        if stats.all_released() {
            Ok(())
        } else {
            Err(format!("resources leaked: {:?}", stats))
        }
    })
}

/// Create an oracle that verifies `on_io_error` never fired.
pub fn no_io_errors() -> OracleFn {
    Box::new(|world| {
        let errors = world.io_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(format!("unexpected I/O errors: {:?}", errors))
        }
    })
}

/// Create an oracle that verifies no operation was rejected.
pub fn no_rejections() -> OracleFn {
    Box::new(|world| {
        if world.rejections().is_empty() {
            Ok(())
        } else {
            Err(format!("operations rejected: {:?}", world.rejections()))
        }
    })
}

/// Combine multiple oracles into one.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| {
        for oracle in oracles {
            oracle(world)?;
        }
        Ok(())
    })
}
