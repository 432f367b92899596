//! Session wiring: one logical control link per process lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use tether_proto::BridgeHealth;

use crate::config::BridgeConfig;
use crate::connection::{Connection, ConnectionState};
use crate::dispatch::{CommandDispatcher, CooldownRegistry, InflightQueue};
use crate::environment::Environment;
use crate::latency::LatencyTracker;
use crate::publisher::ObservationPublisher;
use crate::stats::SessionStats;
use crate::transport::Connector;

/// Cross-context toggles shared by the connection, dispatcher and
/// publisher.
#[derive(Debug)]
pub struct SessionFlags {
    enabled: AtomicBool,
    resync: AtomicBool,
    shutdown: AtomicBool,
}

impl SessionFlags {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            resync: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn request_resync(&self) {
        self.resync.store(true, Ordering::SeqCst);
    }

    pub fn take_resync(&self) -> bool {
        self.resync.swap(false, Ordering::SeqCst)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// The bridge session. Construction wires the components together; the
/// first `tick` call connects to the controller. All environment access
/// happens inside `tick`, on the caller's (single) execution context.
pub struct Session {
    id: Uuid,
    connection: Arc<Connection>,
    dispatcher: Arc<CommandDispatcher>,
    publisher: ObservationPublisher,
    flags: Arc<SessionFlags>,
    stats: Arc<SessionStats>,
    inflight: Arc<InflightQueue>,
    heartbeat_interval: Duration,
    metrics_interval: Duration,
    last_heartbeat: Mutex<Option<Instant>>,
    last_metrics: Mutex<Option<Instant>>,
    started: AtomicBool,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl Session {
    pub fn new(config: &BridgeConfig, connector: Arc<dyn Connector>) -> Self {
        let stats = Arc::new(SessionStats::default());
        let flags = Arc::new(SessionFlags::new());
        let latency = Arc::new(LatencyTracker::new(
            config.latency.max_entries,
            config.latency.horizon,
        ));
        let inflight = Arc::new(InflightQueue::new(config.inflight_capacity));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let connection = Connection::new(
            connector,
            config.reconnect.clone(),
            inbound_tx,
            inflight.clone(),
            flags.clone(),
            stats.clone(),
        );
        let dispatcher = Arc::new(CommandDispatcher::new(
            inflight.clone(),
            CooldownRegistry::new(config.cooldowns.clone()),
            latency.clone(),
            stats.clone(),
        ));
        let publisher = ObservationPublisher::new(
            config.observation_interval(),
            latency,
            flags.clone(),
            stats.clone(),
        );

        Self {
            id: Uuid::new_v4(),
            connection,
            dispatcher,
            publisher,
            flags,
            stats,
            inflight,
            heartbeat_interval: config.heartbeat_interval,
            metrics_interval: config.metrics_interval,
            last_heartbeat: Mutex::new(None),
            last_metrics: Mutex::new(None),
            started: AtomicBool::new(false),
            inbound_rx: Mutex::new(Some(inbound_rx)),
        }
    }

    /// Drives the bridge once per host simulation step, on the
    /// environment's execution context. The first call triggers the initial
    /// connect; commands queued by the receive path are executed here.
    pub async fn tick<E: Environment>(&self, env: &mut E, now: Instant) {
        self.ensure_started();
        self.dispatcher.drain(env, &self.connection, now).await;
        self.publisher.tick(env, &self.connection, now).await;
        self.heartbeat(now).await;
        self.sample_metrics(now);
    }

    fn ensure_started(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(target: "tether::session", session = %self.id, "starting control session");

        if let Some(mut inbound_rx) = self.inbound_rx.lock().unwrap().take() {
            let dispatcher = self.dispatcher.clone();
            let connection = self.connection.clone();
            tokio::spawn(async move {
                while let Some(raw) = inbound_rx.recv().await {
                    if let Some(health) = dispatcher.on_message(&raw, Instant::now()) {
                        connection.emit_health(health).await;
                    }
                }
            });
        }

        let connection = self.connection.clone();
        tokio::spawn(connection.connect());
    }

    async fn heartbeat(&self, now: Instant) {
        if !self.connection.is_open() {
            return;
        }
        let due = {
            let last = self.last_heartbeat.lock().unwrap();
            last.map(|at| now.saturating_duration_since(at) >= self.heartbeat_interval)
                .unwrap_or(true)
        };
        if !due {
            return;
        }
        *self.last_heartbeat.lock().unwrap() = Some(now);
        self.connection.emit_health(BridgeHealth::info("alive")).await;
    }

    fn sample_metrics(&self, now: Instant) {
        let due = {
            let last = self.last_metrics.lock().unwrap();
            last.map(|at| now.saturating_duration_since(at) >= self.metrics_interval)
                .unwrap_or(true)
        };
        if !due {
            return;
        }
        *self.last_metrics.lock().unwrap() = Some(now);

        let snapshot = self.stats.snapshot();
        debug!(
            target: "tether::session",
            session = %self.id,
            reconnects = snapshot.reconnects,
            sent_observations = snapshot.sent_observations,
            dropped_observations = snapshot.dropped_observations,
            dropped_sends = snapshot.dropped_sends,
            stale_rejections = snapshot.stale_rejections,
            dropped_inputs = snapshot.dropped_inputs,
            inflight = self.inflight.len(),
            "session counters"
        );
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        self.stats.clone()
    }

    pub fn last_accepted_seq(&self) -> u64 {
        self.dispatcher.last_accepted_seq()
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    /// Toggles the observation publisher, returning the new state.
    pub fn toggle_publisher(&self) -> bool {
        let enabled = !self.flags.is_enabled();
        self.set_publisher_enabled(enabled);
        enabled
    }

    pub fn set_publisher_enabled(&self, enabled: bool) {
        self.flags.set_enabled(enabled);
        info!(
            target: "tether::session",
            session = %self.id,
            enabled,
            "observation publisher toggled"
        );
    }

    pub fn publisher_enabled(&self) -> bool {
        self.flags.is_enabled()
    }

    /// Tears the session down: the reconnect loop stops between attempts
    /// and the link is dropped.
    pub fn shutdown(&self) {
        self.flags.shutdown();
        self.connection.teardown();
        info!(target: "tether::session", session = %self.id, "session closed");
    }
}
