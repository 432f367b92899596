//! Seam between the bridge and the simulated world. Everything here is
//! callable only from the environment's single execution context; the
//! bridge marshals all command execution onto that context before touching
//! these traits.

use serde_json::Value;
use thiserror::Error;

use tether_proto::SubCommand;

pub mod sim;

/// Why the environment refused a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("action rejected: {reason}")]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub trait SnapshotProducer {
    /// Produces the current world snapshot. The schema is owned by the
    /// producer; the bridge treats it as opaque.
    fn capture(&mut self) -> Value;
}

pub trait ActionExecutor {
    /// Applies a single sub-command. Not reentrant.
    fn apply(&mut self, command: &SubCommand) -> Result<(), Rejection>;
}

pub trait EnvironmentClock {
    /// The world's own monotonic tick. May skip values, never decreases.
    fn now_tick(&self) -> u64;
}

pub trait Environment: SnapshotProducer + ActionExecutor + EnvironmentClock {}

impl<T: SnapshotProducer + ActionExecutor + EnvironmentClock> Environment for T {}
