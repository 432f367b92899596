use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tether::config::BridgeConfig;
use tether::environment::sim::SimEnvironment;
use tether::session::Session;
use tether::transport::websocket::WebSocketConnector;

/// Bridges a simulated agent to a remote controller process.
#[derive(Debug, Parser)]
#[command(name = "tether")]
struct Cli {
    /// Controller websocket endpoint.
    #[arg(long, env = "TETHER_CONTROLLER_URL")]
    controller_url: Option<String>,
    /// Observation publish rate, Hz.
    #[arg(long, env = "TETHER_OBS_HZ")]
    hz: Option<u32>,
    /// Host simulation tick rate, Hz.
    #[arg(long, default_value_t = 20)]
    tick_rate: u32,
    /// Start with the observation publisher disabled.
    #[arg(long)]
    paused: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = BridgeConfig::from_env();
    if let Some(url) = cli.controller_url {
        config.controller_url = url;
    }
    if let Some(hz) = cli.hz {
        config.observation_hz = hz.clamp(1, 60);
    }

    let connector = Arc::new(WebSocketConnector::new(&config.controller_url)?);
    let session = Session::new(&config, connector);
    if cli.paused {
        session.set_publisher_enabled(false);
    }
    let mut env = SimEnvironment::new();

    info!(
        controller = %config.controller_url,
        hz = config.observation_hz,
        session = %session.id(),
        "tether bridge running"
    );

    let mut ticker = interval(Duration::from_millis(
        (1000 / u64::from(cli.tick_rate.max(1))).max(1),
    ));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                env.advance();
                session.tick(&mut env, Instant::now()).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                session.shutdown();
                break;
            }
        }
    }
    Ok(())
}
