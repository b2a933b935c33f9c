//! Transport abstraction for the chat client.
//!
//! This module provides a pluggable transport layer between the chat
//! session and the relay (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` opens the connection to the relay
//! - `send()` writes one inbound frame
//! - `recv()` waits for the next frame the relay pushes
//! - `close()` gracefully terminates
//!
//! `send` and `recv` may be called concurrently from different tasks.

mod mock;
mod ws;

pub use mock::MockTransport;
pub use ws::{chat_url, WsTransport};

use async_trait::async_trait;
use chat_types::{ErrorKind, FrameError, InboundFrame, OutboundFrame};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The relay sent something that is not a frame.
    #[error("bad frame: {0}")]
    Frame(#[from] FrameError),
}

impl TransportError {
    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Frame(_) => ErrorKind::InvalidFormat,
            _ => ErrorKind::TransportError,
        }
    }
}

/// Connection to the relay.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the relay at `address`.
    async fn connect(&self, address: &str) -> Result<(), TransportError>;

    /// Send one frame.
    async fn send(&self, frame: &InboundFrame) -> Result<(), TransportError>;

    /// Receive the next frame pushed by the relay.
    ///
    /// Blocks until a frame arrives or the connection closes.
    async fn recv(&self) -> Result<OutboundFrame, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
