//! WebSocket transport to the relay's `/chat` endpoint.
//!
//! The socket is split once at connect time. Reader and writer halves sit
//! behind separate locks so a task blocked in `recv()` never holds up a
//! `send()` from another task.

use super::{Transport, TransportError};
use async_trait::async_trait;
use chat_types::{InboundFrame, OutboundFrame};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Map a relay base URL to its chat endpoint.
///
/// `http` becomes `ws` and `https` becomes `wss`; a URL that already uses a
/// WebSocket scheme is kept. A trailing `/` is dropped before `/chat`.
pub fn chat_url(server: &str) -> String {
    let base = server.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        format!("ws://{base}")
    };
    format!("{base}/chat")
}

/// Transport over a single WebSocket authenticated with a bearer token.
pub struct WsTransport {
    token: String,
    writer: Mutex<Option<SplitSink<Socket, Message>>>,
    reader: Mutex<Option<SplitStream<Socket>>>,
    connected: AtomicBool,
}

impl WsTransport {
    /// Create an unconnected transport that will present `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    fn mark_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("token", &"[REDACTED]")
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let mut request = address
            .into_client_request()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| TransportError::ConnectionFailed(format!("invalid token: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let (sink, stream) = socket.split();

        *self.writer.lock().await = Some(sink);
        *self.reader.lock().await = Some(stream);
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(%address, "connected to relay");
        Ok(())
    }

    async fn send(&self, frame: &InboundFrame) -> Result<(), TransportError> {
        let text = frame.to_json()?;
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(TransportError::NotConnected)?;

        sink.send(Message::Text(text)).await.map_err(|e| {
            self.mark_closed();
            TransportError::SendFailed(e.to_string())
        })
    }

    async fn recv(&self) -> Result<OutboundFrame, TransportError> {
        let mut reader = self.reader.lock().await;
        let stream = reader.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(OutboundFrame::from_json(text.as_bytes())?)
                }
                Some(Ok(Message::Binary(bytes))) => return Ok(OutboundFrame::from_json(&bytes)?),
                Some(Ok(Message::Close(_))) | None => {
                    self.mark_closed();
                    return Err(TransportError::ConnectionClosed);
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.mark_closed();
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.mark_closed();
        if let Some(mut sink) = self.writer.lock().await.take() {
            // The peer may already be gone
            let _ = sink.close().await;
        }
        Ok(())
    }
}
