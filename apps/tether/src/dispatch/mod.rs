//! Inbound command handling: freshness filtering on the receive context,
//! throttled execution on the environment tick context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, trace, warn};

use tether_proto::{
    decode_inbound, encode_action_result, ActionResult, ActionStatus, BridgeHealth, Inbound,
};

use crate::connection::Connection;
use crate::environment::{ActionExecutor, EnvironmentClock};
use crate::latency::LatencyTracker;
use crate::stats::SessionStats;
use crate::util::unix_millis;

pub mod cooldown;
pub mod inflight;

pub use cooldown::CooldownRegistry;
pub use inflight::{InflightEntry, InflightQueue};

pub struct CommandDispatcher {
    inflight: Arc<InflightQueue>,
    cooldowns: Mutex<CooldownRegistry>,
    latency: Arc<LatencyTracker>,
    stats: Arc<SessionStats>,
    last_accepted_seq: AtomicU64,
}

impl CommandDispatcher {
    pub fn new(
        inflight: Arc<InflightQueue>,
        cooldowns: CooldownRegistry,
        latency: Arc<LatencyTracker>,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            inflight,
            cooldowns: Mutex::new(cooldowns),
            latency,
            stats,
            last_accepted_seq: AtomicU64::new(0),
        }
    }

    pub fn last_accepted_seq(&self) -> u64 {
        self.last_accepted_seq.load(Ordering::SeqCst)
    }

    /// Runs on the transport receive context: parse, reject stale sequences,
    /// queue the payload. Returns a health event to emit when accepting this
    /// message evicted an older queued command.
    pub fn on_message(&self, raw: &str, now: Instant) -> Option<BridgeHealth> {
        let message = match decode_inbound(raw) {
            Ok(Inbound::Action(message)) => message,
            Ok(Inbound::Ignored { kind }) => {
                trace!(target: "tether::dispatch", kind = %kind, "ignoring inbound message");
                return None;
            }
            Err(err) => {
                self.stats.malformed_inbound.fetch_add(1, Ordering::Relaxed);
                warn!(target: "tether::dispatch", error = %err, "discarding malformed inbound message");
                return None;
            }
        };

        if let Some(seq) = message.seq {
            // fetch_max leaves the counter untouched for stale values, so
            // acceptance stays strictly increasing without a lock.
            let prev = self.last_accepted_seq.fetch_max(seq, Ordering::SeqCst);
            if seq <= prev {
                self.stats.stale_rejections.fetch_add(1, Ordering::Relaxed);
                debug!(
                    target: "tether::dispatch",
                    seq,
                    last_accepted = prev,
                    "discarding stale action"
                );
                return None;
            }
        }

        let Some(payload) = message.payload else {
            debug!(target: "tether::dispatch", seq = ?message.seq, "discarding action without payload");
            return None;
        };

        let evicted = self.inflight.push(InflightEntry {
            seq: message.seq,
            action_id: message.action_id,
            payload,
            received_at: now,
        });
        if let Some(evicted) = evicted {
            self.stats.dropped_inputs.fetch_add(1, Ordering::Relaxed);
            warn!(
                target: "tether::dispatch",
                seq = ?evicted.seq,
                "inflight queue full, dropping oldest command"
            );
            return Some(BridgeHealth::warn("dropped_input"));
        }
        None
    }

    /// Drains queued commands on the environment tick context, emitting one
    /// result per requested sub-command.
    pub async fn drain<E>(&self, env: &mut E, connection: &Connection, now: Instant)
    where
        E: ActionExecutor + EnvironmentClock,
    {
        while let Some(entry) = self.inflight.pop() {
            let latency_ms = entry
                .seq
                .and_then(|seq| self.latency.resolve(seq, now))
                .map(|rtt| rtt.as_millis() as u64);
            trace!(
                target: "tether::dispatch",
                seq = ?entry.seq,
                queued_ms = now.saturating_duration_since(entry.received_at).as_millis() as u64,
                "executing command"
            );

            for command in entry.payload.commands() {
                let kind = command.kind();
                let allowed = self.cooldowns.lock().unwrap().try_acquire(kind, now);
                let (status, reason) = if !allowed {
                    self.stats.actions_throttled.fetch_add(1, Ordering::Relaxed);
                    (ActionStatus::Cooldown, Some(format!("{kind}_cooldown")))
                } else {
                    match env.apply(&command) {
                        Ok(()) => {
                            self.stats.actions_executed.fetch_add(1, Ordering::Relaxed);
                            (ActionStatus::Success, None)
                        }
                        Err(rejection) => (ActionStatus::Fail, Some(rejection.reason)),
                    }
                };

                let result = ActionResult {
                    action_id: entry
                        .action_id
                        .clone()
                        .unwrap_or_else(|| format!("{kind}@{}", entry.seq.unwrap_or(0))),
                    status,
                    reason,
                    server_tick: env.now_tick(),
                    ts_server: unix_millis(),
                    latency_ms,
                };
                match encode_action_result(unix_millis(), &result) {
                    Ok(text) => {
                        let _ = connection.send_text(text).await;
                    }
                    Err(err) => {
                        warn!(target: "tether::dispatch", error = %err, "failed to encode action result");
                    }
                }
            }
        }
    }
}
