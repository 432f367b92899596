use std::env;
use std::time::Duration;

use tether_proto::ActionKind;

/// Bridge configuration. Defaults match the reference deployment; every
/// knob can be overridden through `TETHER_*` environment variables.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Controller websocket endpoint.
    pub controller_url: String,
    /// Observation publish rate. The host simulation may tick faster; the
    /// publisher rate-limits independently.
    pub observation_hz: u32,
    /// Capacity of the pending-command queue.
    pub inflight_capacity: usize,
    pub cooldowns: CooldownConfig,
    pub reconnect: ReconnectConfig,
    pub latency: LatencyConfig,
    /// Interval between `alive` health pings while the link is open.
    pub heartbeat_interval: Duration,
    /// Interval between counter snapshots in the logs.
    pub metrics_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct CooldownConfig {
    pub attack: Duration,
    pub use_item: Duration,
    pub place: Duration,
}

impl CooldownConfig {
    /// The configured interval for a gated kind, `None` for ungated kinds.
    pub fn interval(&self, kind: ActionKind) -> Option<Duration> {
        match kind {
            ActionKind::Attack => Some(self.attack),
            ActionKind::Use => Some(self.use_item),
            ActionKind::Place => Some(self.place),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct LatencyConfig {
    pub max_entries: usize,
    pub horizon: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            controller_url: "ws://127.0.0.1:8765".to_string(),
            observation_hz: 12,
            inflight_capacity: 64,
            cooldowns: CooldownConfig {
                attack: Duration::from_millis(250),
                use_item: Duration::from_millis(200),
                place: Duration::from_millis(300),
            },
            reconnect: ReconnectConfig {
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
            },
            latency: LatencyConfig {
                max_entries: 256,
                horizon: Duration::from_secs(10),
            },
            heartbeat_interval: Duration::from_secs(2),
            metrics_interval: Duration::from_secs(5),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var("TETHER_CONTROLLER_URL") {
            let url = url.trim();
            if !url.is_empty() {
                config.controller_url = url.to_string();
            }
        }
        if let Some(hz) = env_var::<u32>("TETHER_OBS_HZ") {
            config.observation_hz = hz.clamp(1, 60);
        }
        if let Some(capacity) = env_var::<usize>("TETHER_INFLIGHT_CAPACITY") {
            config.inflight_capacity = capacity.max(1);
        }
        if let Some(ms) = env_var::<u64>("TETHER_ATTACK_COOLDOWN_MS") {
            config.cooldowns.attack = Duration::from_millis(ms);
        }
        if let Some(ms) = env_var::<u64>("TETHER_USE_COOLDOWN_MS") {
            config.cooldowns.use_item = Duration::from_millis(ms);
        }
        if let Some(ms) = env_var::<u64>("TETHER_PLACE_COOLDOWN_MS") {
            config.cooldowns.place = Duration::from_millis(ms);
        }
        if let Some(ms) = env_var::<u64>("TETHER_RECONNECT_BASE_MS") {
            config.reconnect.base_delay = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = env_var::<u64>("TETHER_RECONNECT_MAX_MS") {
            config.reconnect.max_delay = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = env_var::<u64>("TETHER_HEARTBEAT_MS") {
            config.heartbeat_interval = Duration::from_millis(ms.max(100));
        }
        config
    }

    /// Minimum gap between observation sends.
    pub fn observation_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.observation_hz.max(1)))
    }
}

fn env_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok()?.trim().parse().ok()
}
