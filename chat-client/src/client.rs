//! ChatClient - the main interface for pairchat.
//!
//! This module provides [`ChatClient`], which owns the local keypair and a
//! [`Transport`] to the relay. It encrypts outgoing plaintext for a peer's
//! public key and opens frames the relay pushes back.
//!
//! ```text
//! Application → ChatClient → Transport → Relay
//!                   ↓
//!             crypto (chunked RSA)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use chat_client::{ChatClient, ChatConfig, WsTransport};
//!
//! let config = ChatConfig::new("alice", "http://relay:8080", token);
//! let client = ChatClient::new(config, WsTransport::new(&token), keys);
//!
//! client.connect().await?;
//! client.send_to("bob", &bob_key, b"hello").await?;
//! let frame = client.recv().await?;
//! let plaintext = client.open(&frame)?;
//! ```

use chat_types::{ErrorKind, InboundFrame, OutboundFrame};
use rsa::RsaPublicKey;
use thiserror::Error;

use crate::crypto::{self, CodecError, KeyPair};
use crate::directory::DirectoryError;
use crate::transport::{chat_url, Transport, TransportError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Codec error.
    #[error("{0}")]
    Codec(#[from] CodecError),

    /// Key directory error.
    #[error("{0}")]
    Directory(#[from] DirectoryError),

    /// Terminal input or output failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Not connected to relay.
    #[error("not connected")]
    NotConnected,
}

impl ClientError {
    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(e) => e.kind(),
            Self::Codec(e) => e.kind(),
            Self::Directory(e) => e.kind(),
            Self::Io(_) | Self::NotConnected => ErrorKind::TransportError,
        }
    }
}

/// Configuration for ChatClient.
#[derive(Clone)]
pub struct ChatConfig {
    /// Local handle.
    pub username: String,
    /// Relay base URL (`http://host:port`).
    pub server: String,
    /// Session token presented to the relay.
    pub token: String,
}

impl ChatConfig {
    /// Create a configuration.
    pub fn new(username: &str, server: &str, token: &str) -> Self {
        Self {
            username: username.to_string(),
            server: server.to_string(),
            token: token.to_string(),
        }
    }

    /// WebSocket URL of the relay's chat endpoint.
    pub fn chat_address(&self) -> String {
        chat_url(&self.server)
    }
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("username", &self.username)
            .field("server", &self.server)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Encrypting client bound to one relay connection.
pub struct ChatClient<T: Transport> {
    config: ChatConfig,
    transport: T,
    keys: KeyPair,
}

impl<T: Transport> ChatClient<T> {
    /// Create a new client. Does not connect.
    pub fn new(config: ChatConfig, transport: T, keys: KeyPair) -> Self {
        Self {
            config,
            transport,
            keys,
        }
    }

    /// Connect to the relay's chat endpoint.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let address = self.config.chat_address();
        self.transport.connect(&address).await?;
        tracing::info!(username = %self.config.username, %address, "connected");
        Ok(())
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Disconnect from the relay.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.transport.close().await?;
        Ok(())
    }

    /// Encrypt `plaintext` for `peer_key` and send it to `peer`.
    ///
    /// Empty plaintext fails with [`CodecError::EmptyMessage`] and nothing
    /// is sent.
    pub async fn send_to(
        &self,
        peer: &str,
        peer_key: &RsaPublicKey,
        plaintext: &[u8],
    ) -> Result<(), ClientError> {
        let content = crypto::encrypt(plaintext, peer_key)?;

        if !self.transport.is_connected() {
            return Err(ClientError::NotConnected);
        }

        self.transport
            .send(&InboundFrame::new(peer, content))
            .await?;
        Ok(())
    }

    /// Wait for the next frame from the relay.
    pub async fn recv(&self) -> Result<OutboundFrame, ClientError> {
        Ok(self.transport.recv().await?)
    }

    /// Decrypt a frame addressed to this client.
    pub fn open(&self, frame: &OutboundFrame) -> Result<Vec<u8>, CodecError> {
        crypto::decrypt(&frame.content, self.keys.private_key())
    }

    /// Local configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Local keypair.
    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    /// Get a reference to the transport (for testing).
    pub fn transport(&self) -> &T {
        &self.transport
    }
}
