use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::fmt;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// Outbound half of a client connection. The engine only ever writes frames,
/// pings and a close, so the seam stays narrow and tests can plug in a
/// recording stub.
#[async_trait]
pub trait FrameTransport: Send + Sync {
    async fn send_text(&self, frame: &str) -> Result<(), TransportError>;
    async fn send_ping(&self) -> Result<(), TransportError>;
    async fn close(&self);
}

/// Production transport over the write half of an axum WebSocket.
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsTransport {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        WsTransport {
            sink: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl FrameTransport for WsTransport {
    async fn send_text(&self, frame: &str) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| TransportError(e.to_string()))
    }

    async fn send_ping(&self) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportError(e.to_string()))
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
    }
}
