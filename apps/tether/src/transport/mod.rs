use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod mock;
pub mod websocket;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("transport closed")]
    Closed,
}

/// Write half of a controller link. Cheap to share behind an `Arc`; a send
/// must not block the caller beyond channel handoff.
#[async_trait]
pub trait TransportSink: Send + Sync {
    async fn send(&self, text: String) -> Result<(), TransportError>;
    fn is_connected(&self) -> bool;
}

/// Read half of a controller link. `next` resolves to `None` once the link
/// closes, locally or at the peer.
#[async_trait]
pub trait TransportStream: Send {
    async fn next(&mut self) -> Option<String>;
}

pub struct TransportPair {
    pub sink: Arc<dyn TransportSink>,
    pub stream: Box<dyn TransportStream>,
}

/// Dials fresh controller links. The reconnect supervisor calls this once
/// per attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn dial(&self) -> Result<TransportPair, TransportError>;
}
