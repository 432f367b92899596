use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use tether_proto::encode_observation;

use crate::connection::Connection;
use crate::environment::{EnvironmentClock, SnapshotProducer};
use crate::latency::LatencyTracker;
use crate::session::SessionFlags;
use crate::stats::SessionStats;
use crate::util::unix_millis;

/// Publishes rate-limited observation snapshots tagged with the
/// environment's own tick counter. Observations are perishable: while the
/// link is down they are counted and dropped, never buffered.
pub struct ObservationPublisher {
    interval: Duration,
    latency: Arc<LatencyTracker>,
    flags: Arc<SessionFlags>,
    stats: Arc<SessionStats>,
    last_send: Mutex<Option<Instant>>,
}

impl ObservationPublisher {
    pub fn new(
        interval: Duration,
        latency: Arc<LatencyTracker>,
        flags: Arc<SessionFlags>,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            interval,
            latency,
            flags,
            stats,
            last_send: Mutex::new(None),
        }
    }

    /// Invoked once per host simulation step on the environment context.
    /// Sends at most one observation per configured interval; a pending
    /// resync bypasses the rate limit exactly once.
    pub async fn tick<E>(&self, env: &mut E, connection: &Connection, now: Instant)
    where
        E: SnapshotProducer + EnvironmentClock,
    {
        if !self.flags.is_enabled() {
            return;
        }
        let resync = self.flags.take_resync();
        let due = {
            let last = self.last_send.lock().unwrap();
            resync
                || last
                    .map(|at| now.saturating_duration_since(at) >= self.interval)
                    .unwrap_or(true)
        };
        if !due {
            return;
        }
        *self.last_send.lock().unwrap() = Some(now);

        let seq = env.now_tick();
        let payload = env.capture();

        if !connection.is_open() {
            self.stats
                .dropped_observations
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            trace!(target: "tether::publisher", seq, "observation dropped while link down");
            return;
        }

        match encode_observation(seq, unix_millis(), &payload) {
            Ok(text) => {
                self.latency.record_sent(seq, now);
                if connection.send_text(text).await {
                    self.stats
                        .sent_observations
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    if resync {
                        debug!(target: "tether::publisher", seq, "resync observation sent");
                    }
                }
            }
            Err(err) => {
                warn!(target: "tether::publisher", error = %err, "failed to encode observation");
            }
        }
    }
}
