use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Shared bridge counters, injected into the connection, dispatcher and
/// publisher rather than living as ambient globals. Counters are advisory:
/// relaxed ordering is enough.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub reconnects: AtomicU64,
    pub dropped_sends: AtomicU64,
    pub dropped_observations: AtomicU64,
    pub sent_observations: AtomicU64,
    pub stale_rejections: AtomicU64,
    pub malformed_inbound: AtomicU64,
    pub dropped_inputs: AtomicU64,
    pub actions_executed: AtomicU64,
    pub actions_throttled: AtomicU64,
}

impl SessionStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reconnects: self.reconnects.load(Ordering::Relaxed),
            dropped_sends: self.dropped_sends.load(Ordering::Relaxed),
            dropped_observations: self.dropped_observations.load(Ordering::Relaxed),
            sent_observations: self.sent_observations.load(Ordering::Relaxed),
            stale_rejections: self.stale_rejections.load(Ordering::Relaxed),
            malformed_inbound: self.malformed_inbound.load(Ordering::Relaxed),
            dropped_inputs: self.dropped_inputs.load(Ordering::Relaxed),
            actions_executed: self.actions_executed.load(Ordering::Relaxed),
            actions_throttled: self.actions_throttled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter values, serializable for diagnostics tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub reconnects: u64,
    pub dropped_sends: u64,
    pub dropped_observations: u64,
    pub sent_observations: u64,
    pub stale_rejections: u64,
    pub malformed_inbound: u64,
    pub dropped_inputs: u64,
    pub actions_executed: u64,
    pub actions_throttled: u64,
}
