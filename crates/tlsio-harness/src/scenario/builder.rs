//! Scenario builder API.
//!
//! Provides a declarative API for constructing scenario tests that enforce
//! the Oracle Pattern.

use std::time::Duration;

use tlsio_core::{ConnectionState, TlsIoConfig};

use crate::{
    SimNetwork,
    scenario::{OracleFn, World},
};

type NetworkScript = Box<dyn FnOnce(&SimNetwork)>;

enum Step {
    Open,
    Poll(usize),
    PollUntil(ConnectionState, usize),
    Advance(Duration),
    Send(Vec<u8>),
    Deliver(Vec<u8>),
    Network(NetworkScript),
    Close,
}

/// Scenario builder.
///
/// Configure the connection and the network, list the steps to drive, and
/// add an oracle verification function.
pub struct Scenario {
    config: TlsIoConfig,
    seed: u64,
    setup: Vec<NetworkScript>,
    steps: Vec<Step>,
}

impl Scenario {
    /// Create a new scenario for `scenario.test:443` with default timeouts.
    pub fn new() -> Self {
        Self {
            config: TlsIoConfig::new("scenario.test", 443),
            seed: 0,
            setup: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Configure the connection.
    pub fn with_config(mut self, config: TlsIoConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed the network's chunking RNG.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Script the network before the connection is created.
    pub fn with_network(mut self, script: impl FnOnce(&SimNetwork) + 'static) -> Self {
        self.setup.push(Box::new(script));
        self
    }

    /// Call `open`. A rejection is recorded in the world.
    pub fn open(mut self) -> Self {
        self.steps.push(Step::Open);
        self
    }

    /// Call `do_work` `count` times.
    pub fn poll(mut self, count: usize) -> Self {
        self.steps.push(Step::Poll(count));
        self
    }

    /// Poll until the client is in `state`; the run fails after `max_polls`.
    pub fn poll_until(mut self, state: ConnectionState, max_polls: usize) -> Self {
        self.steps.push(Step::PollUntil(state, max_polls));
        self
    }

    /// Advance virtual time.
    pub fn advance(mut self, by: Duration) -> Self {
        self.steps.push(Step::Advance(by));
        self
    }

    /// Call `send`. A rejection is recorded in the world.
    pub fn send(mut self, bytes: &[u8]) -> Self {
        self.steps.push(Step::Send(bytes.to_vec()));
        self
    }

    /// Have the peer send bytes to the client.
    pub fn deliver(mut self, bytes: &[u8]) -> Self {
        self.steps.push(Step::Deliver(bytes.to_vec()));
        self
    }

    /// Change the network script mid-run (inject a fault, unblock writes).
    pub fn network(mut self, script: impl FnOnce(&SimNetwork) + 'static) -> Self {
        self.steps.push(Step::Network(Box::new(script)));
        self
    }

    /// Call `close`. A rejection is recorded in the world.
    pub fn close(mut self) -> Self {
        self.steps.push(Step::Close);
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// 1. Build the network from the seed and setup scripts
    /// 2. Create the connection on a fresh virtual clock
    /// 3. Execute the steps in order
    /// 4. Invoke the oracle to verify global consistency
    pub fn run(self) -> Result<(), String> {
        let Scenario { config, seed, setup, steps } = self.scenario;

        let net = SimNetwork::with_seed(seed);
        for script in setup {
            script(&net);
        }

        let mut world = World::new(config, net)?;
        for step in steps {
            execute(&mut world, step)?;
        }

        (self.oracle)(&world)?;

        Ok(())
    }
}

fn execute(world: &mut World, step: Step) -> Result<(), String> {
    match step {
        Step::Open => {
            if let Err(e) = world.client_mut().open() {
                world.record_rejection("open", e);
            }
        },
        Step::Poll(count) => {
            for _ in 0..count {
                world.poll();
            }
        },
        Step::PollUntil(state, max_polls) => {
            let mut polls = 0;
            while world.state() != state {
                if polls == max_polls {
                    return Err(format!(
                        "client did not reach {:?} within {} polls, stuck in {:?}",
                        state,
                        max_polls,
                        world.state()
                    ));
                }
                world.poll();
                polls += 1;
            }
        },
        Step::Advance(by) => world.advance(by),
        Step::Send(bytes) => {
            if let Err(e) = world.client_mut().send(&bytes) {
                world.record_rejection("send", e);
            }
        },
        Step::Deliver(bytes) => world.peer().deliver(&bytes),
        Step::Network(script) => script(world.peer().network()),
        Step::Close => {
            if let Err(e) = world.client_mut().close() {
                world.record_rejection("close", e);
            }
        },
    }
    Ok(())
}
