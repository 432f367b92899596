use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::{sleep, timeout};

use tether::config::BridgeConfig;
use tether::environment::sim::SimEnvironment;
use tether::session::Session;
use tether::transport::mock::{MockConnector, MockLink};

fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.observation_hz = 10;
    config.inflight_capacity = 4;
    config.reconnect.base_delay = Duration::from_millis(10);
    config
}

async fn open_session(config: BridgeConfig) -> (Session, MockLink, SimEnvironment, Instant) {
    let (connector, mut links) = MockConnector::new();
    let session = Session::new(&config, connector);
    let mut env = SimEnvironment::new();
    env.advance();

    let t0 = Instant::now();
    session.tick(&mut env, t0).await;
    let link = timeout(Duration::from_secs(2), links.recv())
        .await
        .expect("connect timed out")
        .expect("connector gone");
    wait_until("link open", || session.state() == tether::connection::ConnectionState::Open).await;
    (session, link, env, t0)
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn recv_kind(link: &mut MockLink, kind: &str) -> Value {
    loop {
        let raw = timeout(Duration::from_secs(2), link.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for `{kind}`"))
            .expect("link closed");
        let value: Value = serde_json::from_str(&raw).expect("bridge sent invalid json");
        if value["kind"] == kind {
            return value;
        }
    }
}

async fn assert_no_kind(link: &mut MockLink, kind: &str, wait: Duration) {
    let deadline = Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        match timeout(remaining, link.recv()).await {
            Ok(Some(raw)) => {
                let value: Value = serde_json::from_str(&raw).unwrap();
                assert_ne!(value["kind"], kind, "unexpected `{kind}`: {raw}");
            }
            Ok(None) | Err(_) => return,
        }
    }
}

#[tokio::test]
async fn publishes_rate_limited_observations() {
    let (session, mut link, mut env, t0) = open_session(test_config()).await;
    env.advance();

    session.tick(&mut env, t0 + Duration::from_millis(200)).await;
    let observation = recv_kind(&mut link, "observation").await;
    assert_eq!(observation["proto"], "1");
    assert_eq!(observation["seq"], 2);
    assert!(observation["payload"]["pose"]["x"].is_number());
    assert_eq!(observation["payload"]["collision"]["is_grounded"], true);

    // Within the configured interval no second observation goes out.
    session.tick(&mut env, t0 + Duration::from_millis(210)).await;
    assert_no_kind(&mut link, "observation", Duration::from_millis(120)).await;
}

#[tokio::test]
async fn executes_actions_and_reports_latency() {
    let (session, mut link, mut env, t0) = open_session(test_config()).await;
    env.advance();

    let t1 = t0 + Duration::from_millis(200);
    session.tick(&mut env, t1).await;
    let observation = recv_kind(&mut link, "observation").await;
    let seq = observation["seq"].as_u64().unwrap();

    assert!(link.inject(format!(
        r#"{{"kind":"action","seq":{seq},"action_id":"act-1","payload":{{"jump":true}}}}"#
    )));
    wait_until("action queued", || session.inflight_len() == 1).await;

    session.tick(&mut env, t1 + Duration::from_millis(150)).await;
    let result = recv_kind(&mut link, "action_result").await;
    let body = &result["payload"]["action_result"];
    assert_eq!(body["action_id"], "act-1");
    assert_eq!(body["status"], "success");
    assert_eq!(body["latency_ms"], 150);

    // The jump left the agent airborne; a second jump must fail.
    assert!(link.inject(format!(
        r#"{{"kind":"action","seq":{},"payload":{{"jump":true}}}}"#,
        seq + 1
    )));
    wait_until("action queued", || session.inflight_len() == 1).await;
    session.tick(&mut env, t1 + Duration::from_millis(160)).await;

    let result = recv_kind(&mut link, "action_result").await;
    let body = &result["payload"]["action_result"];
    assert_eq!(body["status"], "fail");
    assert_eq!(body["reason"], "not_grounded");
}

#[tokio::test]
async fn stale_sequences_are_discarded_silently() {
    let (session, mut link, mut env, t0) = open_session(test_config()).await;
    let stats = session.stats();

    assert!(link.inject(r#"{"kind":"action","seq":80,"payload":{"jump":true}}"#));
    wait_until("action queued", || session.inflight_len() == 1).await;
    session.tick(&mut env, t0 + Duration::from_millis(200)).await;
    recv_kind(&mut link, "action_result").await;
    assert_eq!(session.last_accepted_seq(), 80);

    assert!(link.inject(r#"{"kind":"action","seq":50,"payload":{"jump":true}}"#));
    wait_until("stale rejection counted", || {
        stats.snapshot().stale_rejections == 1
    })
    .await;
    assert_eq!(session.last_accepted_seq(), 80);
    assert_eq!(session.inflight_len(), 0);

    session.tick(&mut env, t0 + Duration::from_millis(220)).await;
    assert_no_kind(&mut link, "action_result", Duration::from_millis(120)).await;
}

#[tokio::test]
async fn cooldown_gates_repeated_attacks() {
    let (session, mut link, mut env, t0) = open_session(test_config()).await;

    assert!(link.inject(r#"{"kind":"action","seq":1,"payload":{"attack":true}}"#));
    assert!(link.inject(r#"{"kind":"action","seq":2,"payload":{"attack":true}}"#));
    wait_until("actions queued", || session.inflight_len() == 2).await;

    let t1 = t0 + Duration::from_millis(200);
    session.tick(&mut env, t1).await;

    let first = recv_kind(&mut link, "action_result").await;
    assert_eq!(first["payload"]["action_result"]["status"], "success");
    let second = recv_kind(&mut link, "action_result").await;
    assert_eq!(second["payload"]["action_result"]["status"], "cooldown");
    assert_eq!(
        second["payload"]["action_result"]["reason"],
        "attack_cooldown"
    );

    // Beyond the attack interval the next request succeeds again.
    assert!(link.inject(r#"{"kind":"action","seq":3,"payload":{"attack":true}}"#));
    wait_until("action queued", || session.inflight_len() == 1).await;
    session.tick(&mut env, t1 + Duration::from_millis(300)).await;
    let third = recv_kind(&mut link, "action_result").await;
    assert_eq!(third["payload"]["action_result"]["status"], "success");
}

#[tokio::test]
async fn overflow_evicts_oldest_and_reports_dropped_input() {
    let (session, mut link, mut env, t0) = open_session(test_config()).await;
    let stats = session.stats();

    for seq in 1..=5 {
        assert!(link.inject(format!(
            r#"{{"kind":"action","seq":{seq},"payload":{{"sneak":true}}}}"#
        )));
    }
    wait_until("eviction counted", || stats.snapshot().dropped_inputs == 1).await;
    assert_eq!(session.inflight_len(), 4);

    // Skip the `connected` health event from session start.
    let health = loop {
        let health = recv_kind(&mut link, "bridge_health").await;
        if health["payload"]["bridge_health"]["detail"] == "dropped_input" {
            break health;
        }
    };
    assert_eq!(health["payload"]["bridge_health"]["level"], "warn");

    // The survivors execute in order; seq 1 was the eviction victim.
    session.tick(&mut env, t0 + Duration::from_millis(200)).await;
    for seq in 2..=5 {
        let result = recv_kind(&mut link, "action_result").await;
        assert_eq!(
            result["payload"]["action_result"]["action_id"],
            format!("sneak@{seq}")
        );
    }
}

#[tokio::test]
async fn legacy_flat_actions_still_execute() {
    let (session, mut link, mut env, t0) = open_session(test_config()).await;

    assert!(link.inject(r#"{"action":"jump","params":{}}"#));
    wait_until("action queued", || session.inflight_len() == 1).await;
    session.tick(&mut env, t0 + Duration::from_millis(200)).await;

    let result = recv_kind(&mut link, "action_result").await;
    let body = &result["payload"]["action_result"];
    assert_eq!(body["action_id"], "jump@0");
    assert_eq!(body["status"], "success");
    assert!(body["latency_ms"].is_null());
}

#[tokio::test]
async fn publisher_toggle_suppresses_observations() {
    let (session, mut link, mut env, t0) = open_session(test_config()).await;

    session.set_publisher_enabled(false);
    assert!(!session.publisher_enabled());
    session.tick(&mut env, t0 + Duration::from_secs(1)).await;
    assert_no_kind(&mut link, "observation", Duration::from_millis(120)).await;

    assert!(session.toggle_publisher());
    session.tick(&mut env, t0 + Duration::from_secs(2)).await;
    recv_kind(&mut link, "observation").await;
}

#[tokio::test]
async fn emits_alive_heartbeats_while_open() {
    let mut config = test_config();
    config.heartbeat_interval = Duration::from_millis(50);
    let (session, mut link, mut env, t0) = open_session(config).await;

    session.tick(&mut env, t0 + Duration::from_millis(200)).await;
    let health = recv_kind(&mut link, "bridge_health").await;
    let detail = health["payload"]["bridge_health"]["detail"].clone();
    assert!(detail == "connected" || detail == "alive");

    session.tick(&mut env, t0 + Duration::from_millis(400)).await;
    loop {
        let health = recv_kind(&mut link, "bridge_health").await;
        if health["payload"]["bridge_health"]["detail"] == "alive" {
            break;
        }
    }
}
