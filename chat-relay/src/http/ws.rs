//! WebSocket chat endpoint.
//!
//! Each upgraded socket is bound to the identity its bearer token maps to,
//! registered in the connection registry, and read until it closes. Frames
//! read from it go to the dispatcher; frames for it arrive through
//! [`WsConnection`].

use crate::dispatch::FrameJob;
use crate::error::TransportError;
use crate::registry::{ConnectionId, PeerConnection};
use crate::server::ChatRelay;
use crate::storage::{BoundIdentity, IdentityService};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use chat_types::ErrorKind;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// `GET /chat`
///
/// Authenticates before upgrading: a missing or unknown bearer token is
/// 401, a plain HTTP request with a valid token is 426.
pub async fn chat_handler(
    Extension(relay): Extension<Arc<ChatRelay>>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    };

    let identity = match relay.storage().authenticate(token).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            tracing::debug!("rejected unknown session token");
            return (StatusCode::UNAUTHORIZED, "invalid session token").into_response();
        }
        Err(e) => {
            tracing::error!(
                kind = ErrorKind::PersistenceError.as_str(),
                error = %e,
                "token lookup failed"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(ws) = ws else {
        return StatusCode::UPGRADE_REQUIRED.into_response();
    };

    ws.on_upgrade(move |socket| run_session(relay, identity, socket))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Read loop for one socket.
async fn run_session(relay: Arc<ChatRelay>, identity: BoundIdentity, socket: WebSocket) {
    let (sink, mut stream) = socket.split();
    let conn = Arc::new(WsConnection::new(sink));
    let conn_id = conn.id();

    relay.registry().register(identity.id, conn.clone());
    relay
        .metrics()
        .connections_total
        .fetch_add(1, Ordering::Relaxed);
    tracing::info!(user = %identity.id, username = %identity.username, conn = %conn_id, "connected");

    while let Some(msg) = stream.next().await {
        let payload = match msg {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by the WebSocket layer
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(
                    kind = ErrorKind::TransportError.as_str(),
                    conn = %conn_id,
                    error = %e,
                    "read failed"
                );
                break;
            }
        };

        let job = FrameJob {
            sender: identity.clone(),
            payload,
        };
        if relay.dispatcher().submit(job).await.is_err() {
            tracing::debug!(conn = %conn_id, "dispatcher closed, ending session");
            break;
        }
    }

    relay.registry().unregister(identity.id, conn_id);
    conn.close().await;
    tracing::info!(user = %identity.id, conn = %conn_id, "disconnected");
}

/// Write half of an accepted WebSocket.
pub struct WsConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    closed: AtomicBool,
}

impl WsConnection {
    /// Wrap the write half of a socket.
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            id: ConnectionId::next(),
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
        }
    }

    /// Send a close frame; later sends fail with [`TransportError::Closed`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.sink.lock().await.close().await;
    }
}

#[async_trait]
impl PeerConnection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("Bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
