//! Channel-backed transport used by the test suites. Mirrors the shape of
//! the WebSocket transport without any sockets.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Connector, TransportError, TransportPair, TransportSink, TransportStream};

/// Hands out a fresh in-memory link per dial and surfaces the controller
/// side of each link to the test.
pub struct MockConnector {
    link_tx: mpsc::UnboundedSender<MockLink>,
    dials: AtomicU64,
    refusals: AtomicU64,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockLink>) {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                link_tx,
                dials: AtomicU64::new(0),
                refusals: AtomicU64::new(0),
            }),
            link_rx,
        )
    }

    pub fn dial_count(&self) -> u64 {
        self.dials.load(Ordering::SeqCst)
    }

    /// Makes the next `count` dials fail with a connect error.
    pub fn refuse_next(&self, count: u64) {
        self.refusals.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn dial(&self) -> Result<TransportPair, TransportError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        loop {
            let left = self.refusals.load(Ordering::SeqCst);
            if left == 0 {
                break;
            }
            if self
                .refusals
                .compare_exchange(left, left - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Err(TransportError::Connect("connection refused".to_string()));
            }
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let link = MockLink {
            to_bridge: Some(inbound_tx),
            from_bridge: outbound_rx,
            connected: connected.clone(),
        };
        let pair = TransportPair {
            sink: Arc::new(MockSink {
                tx: outbound_tx,
                connected: connected.clone(),
            }),
            stream: Box::new(MockStream { rx: inbound_rx }),
        };
        let _ = self.link_tx.send(link);
        Ok(pair)
    }
}

/// The controller's view of one mock link.
pub struct MockLink {
    to_bridge: Option<mpsc::UnboundedSender<String>>,
    from_bridge: mpsc::UnboundedReceiver<String>,
    connected: Arc<AtomicBool>,
}

impl MockLink {
    /// Delivers a raw message to the bridge's receive path.
    pub fn inject(&self, text: impl Into<String>) -> bool {
        self.to_bridge
            .as_ref()
            .map(|tx| tx.send(text.into()).is_ok())
            .unwrap_or(false)
    }

    /// Receives the next message the bridge sent.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_bridge.recv().await
    }

    /// Simulates the transport dropping under the bridge.
    pub fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.to_bridge = None;
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSink for MockSink {
    async fn send(&self, text: String) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.tx.is_closed()
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl TransportStream for MockStream {
    async fn next(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}
