use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use tether_proto::{encode_bridge_health, BridgeHealth};

use crate::config::ReconnectConfig;
use crate::dispatch::InflightQueue;
use crate::session::SessionFlags;
use crate::stats::SessionStats;
use crate::transport::{Connector, TransportPair, TransportSink, TransportStream};
use crate::util::unix_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
}

/// Owns the controller link: first connect, loss detection, and the retry
/// loop that reestablishes the transport. The retry worker runs on its own
/// task and never blocks environment ticks; retries are unbounded with
/// exponential backoff and stop only on session teardown.
pub struct Connection {
    connector: Arc<dyn Connector>,
    reconnect: ReconnectConfig,
    sink: Mutex<Option<Arc<dyn TransportSink>>>,
    state: Mutex<ConnectionState>,
    reconnecting: AsyncMutex<bool>,
    inbound_tx: mpsc::UnboundedSender<String>,
    inflight: Arc<InflightQueue>,
    flags: Arc<SessionFlags>,
    stats: Arc<SessionStats>,
}

impl Connection {
    pub fn new(
        connector: Arc<dyn Connector>,
        reconnect: ReconnectConfig,
        inbound_tx: mpsc::UnboundedSender<String>,
        inflight: Arc<InflightQueue>,
        flags: Arc<SessionFlags>,
        stats: Arc<SessionStats>,
    ) -> Arc<Self> {
        Arc::new(Self {
            connector,
            reconnect,
            sink: Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            reconnecting: AsyncMutex::new(false),
            inbound_tx,
            inflight,
            flags,
            stats,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().unwrap() = next;
    }

    pub fn is_open(&self) -> bool {
        if self.state() != ConnectionState::Open {
            return false;
        }
        self.sink
            .lock()
            .unwrap()
            .as_ref()
            .map(|sink| sink.is_connected())
            .unwrap_or(false)
    }

    /// First connect. Attempted once; a failure is logged and handed to the
    /// standard retry loop rather than treated as fatal.
    pub async fn connect(self: Arc<Self>) {
        self.set_state(ConnectionState::Connecting);
        match self.connector.dial().await {
            Ok(pair) => {
                self.install(pair);
                info!(target: "tether::connection", "controller link established");
                self.emit_health(BridgeHealth::info("connected")).await;
            }
            Err(err) => {
                warn!(target: "tether::connection", error = %err, "initial controller connect failed");
                self.schedule_reconnect();
            }
        }
    }

    fn install(self: &Arc<Self>, pair: TransportPair) {
        *self.sink.lock().unwrap() = Some(pair.sink);
        self.set_state(ConnectionState::Open);
        self.spawn_pump(pair.stream);
    }

    fn spawn_pump(self: &Arc<Self>, mut stream: Box<dyn TransportStream>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(raw) = stream.next().await {
                if this.inbound_tx.send(raw).is_err() {
                    return;
                }
            }
            if this.flags.is_shutdown() {
                return;
            }
            warn!(target: "tether::connection", "controller link lost");
            this.schedule_reconnect();
        });
    }

    /// Spawns the retry worker unless one is already running.
    pub(crate) fn schedule_reconnect(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            {
                let mut guard = this.reconnecting.lock().await;
                if *guard {
                    return;
                }
                *guard = true;
            }

            this.set_state(ConnectionState::Reconnecting);
            *this.sink.lock().unwrap() = None;

            let mut delay = this.reconnect.base_delay;
            let mut attempt: u64 = 0;
            loop {
                if this.flags.is_shutdown() {
                    break;
                }
                attempt += 1;
                match this.connector.dial().await {
                    Ok(pair) => {
                        // Commands queued against the dead session are
                        // meaningless on the new one.
                        let discarded = this.inflight.clear();
                        if discarded > 0 {
                            debug!(
                                target: "tether::connection",
                                discarded,
                                "cleared pending commands from dead session"
                            );
                        }
                        this.install(pair);
                        this.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                        this.flags.request_resync();
                        info!(target: "tether::connection", attempt, "controller link reestablished");
                        this.emit_health(BridgeHealth::info("reconnected")).await;
                        break;
                    }
                    Err(err) => {
                        warn!(
                            target: "tether::connection",
                            attempt,
                            error = %err,
                            "reconnect attempt failed"
                        );
                        sleep(delay).await;
                        delay = (delay * 2).min(this.reconnect.max_delay);
                    }
                }
            }

            let mut guard = this.reconnecting.lock().await;
            *guard = false;
        });
    }

    /// Sends raw text on the current link. A failed or linkless send is
    /// counted and absorbed, never surfaced as a state transition.
    pub async fn send_text(&self, text: String) -> bool {
        let sink = self.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => match sink.send(text).await {
                Ok(()) => true,
                Err(err) => {
                    debug!(target: "tether::connection", error = %err, "send failed on open link");
                    self.stats.dropped_sends.fetch_add(1, Ordering::Relaxed);
                    false
                }
            },
            None => {
                self.stats.dropped_sends.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub async fn emit_health(&self, health: BridgeHealth) {
        match encode_bridge_health(unix_millis(), &health) {
            Ok(text) => {
                let _ = self.send_text(text).await;
            }
            Err(err) => {
                warn!(target: "tether::connection", error = %err, "failed to encode health event");
            }
        }
    }

    pub fn teardown(&self) {
        *self.sink.lock().unwrap() = None;
        self.set_state(ConnectionState::Disconnected);
    }
}
