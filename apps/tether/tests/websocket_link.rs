use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;

use tether::config::BridgeConfig;
use tether::environment::sim::SimEnvironment;
use tether::session::Session;
use tether::transport::websocket::WebSocketConnector;

/// Drives the bridge against an in-process websocket controller: one
/// observation out, one jump command back, one action result out.
#[tokio::test]
async fn bridges_over_a_real_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let controller = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let obs_seq = loop {
            let msg = ws.next().await.expect("bridge hung up").unwrap();
            if let Message::Text(text) = msg {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["kind"] == "observation" {
                    assert_eq!(value["proto"], "1");
                    break value["seq"].as_u64().unwrap();
                }
            }
        };

        let action = format!(
            r#"{{"kind":"action","seq":{obs_seq},"action_id":"ws-1","payload":{{"jump":true}}}}"#
        );
        ws.send(Message::Text(action)).await.unwrap();

        loop {
            let msg = ws.next().await.expect("bridge hung up").unwrap();
            if let Message::Text(text) = msg {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["kind"] == "action_result" {
                    break value["payload"]["action_result"].clone();
                }
            }
        }
    });

    let mut config = BridgeConfig::default();
    config.controller_url = format!("ws://{addr}");
    config.observation_hz = 20;
    let connector = Arc::new(WebSocketConnector::new(&config.controller_url).unwrap());
    let session = Session::new(&config, connector);
    let mut env = SimEnvironment::new();

    let driver = async {
        loop {
            env.advance();
            session.tick(&mut env, Instant::now()).await;
            sleep(Duration::from_millis(20)).await;
        }
    };

    let result = tokio::select! {
        result = controller => result.unwrap(),
        _ = driver => unreachable!("driver loop never finishes"),
        _ = sleep(Duration::from_secs(10)) => panic!("end-to-end exchange timed out"),
    };
    assert_eq!(result["action_id"], "ws-1");
    assert_eq!(result["status"], "success");
    assert!(result["latency_ms"].is_u64());
}
