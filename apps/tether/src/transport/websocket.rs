use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::debug;
use url::Url;

use super::{Connector, TransportError, TransportPair, TransportSink, TransportStream};

/// Dials the controller endpoint over a plain WebSocket.
pub struct WebSocketConnector {
    url: Url,
}

impl WebSocketConnector {
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let parsed = Url::parse(url)
            .map_err(|err| TransportError::Connect(format!("invalid controller url `{url}`: {err}")))?;
        Ok(Self { url: parsed })
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn dial(&self) -> Result<TransportPair, TransportError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        Ok(into_pair(stream))
    }
}

/// Splits a websocket into the sink/stream pair the bridge consumes. The
/// write half runs behind a channel so sends never block on socket I/O.
pub fn into_pair<S>(stream: WebSocketStream<S>) -> TransportPair
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, read) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let connected = Arc::new(AtomicBool::new(true));

    let writer_connected = connected.clone();
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if write.send(Message::Text(text)).await.is_err() {
                writer_connected.store(false, Ordering::SeqCst);
                return;
            }
        }
        // Outbound handle dropped: close the socket politely.
        let _ = write.send(Message::Close(None)).await;
    });

    TransportPair {
        sink: Arc::new(WsSink {
            tx,
            connected: connected.clone(),
        }),
        stream: Box::new(WsStream { read, connected }),
    }
}

struct WsSink {
    tx: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSink for WsSink {
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

struct WsStream<S> {
    read: SplitStream<WebSocketStream<S>>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl<S> TransportStream for WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next(&mut self) -> Option<String> {
        while let Some(message) = self.read.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(text),
                    Err(_) => {
                        debug!(target: "tether::transport", "skipping non-utf8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        None
    }
}
