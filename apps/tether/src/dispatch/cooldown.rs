use std::collections::HashMap;
use std::time::Instant;

use tether_proto::ActionKind;

use crate::config::CooldownConfig;

/// Per-action-kind timestamp gate. Only ever touched from the environment
/// tick context.
pub struct CooldownRegistry {
    config: CooldownConfig,
    next_allowed: HashMap<ActionKind, Instant>,
}

impl CooldownRegistry {
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            next_allowed: HashMap::new(),
        }
    }

    /// Returns whether `kind` may fire at `now`, arming the next deadline
    /// when it may. Ungated kinds always pass.
    pub fn try_acquire(&mut self, kind: ActionKind, now: Instant) -> bool {
        let Some(interval) = self.config.interval(kind) else {
            return true;
        };
        if let Some(&until) = self.next_allowed.get(&kind) {
            if now < until {
                return false;
            }
        }
        self.next_allowed.insert(kind, now + interval);
        true
    }
}
