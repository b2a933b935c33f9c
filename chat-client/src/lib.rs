//! # chat-client
//!
//! Client library for pairchat, a pairwise end-to-end encrypted chat relay.
//!
//! ## Features
//!
//! - **E2E Encryption**: chunked RSA PKCS#1 v1.5, only the receiver's
//!   private key can read a message
//! - **Transport Abstraction**: Pluggable transport layer (WebSocket, mock)
//! - **Key Directory**: fetch a peer's published public key over HTTP
//! - **Interactive Session**: line-based chat loop over any async reader
//!   and writer
//!
//! ## Example
//!
//! ```ignore
//! use chat_client::{ChatClient, ChatConfig, ChatSession, KeyDirectoryClient, WsTransport};
//!
//! let peer_key = KeyDirectoryClient::new(&server).public_key("bob").await?;
//! let client = ChatClient::new(ChatConfig::new("alice", &server, &token), WsTransport::new(&token), keys);
//! client.connect().await?;
//!
//! let session = ChatSession::new(client, "bob", peer_key);
//! session.run(tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod crypto;
pub mod directory;
pub mod session;
pub mod transport;

pub use client::{ChatClient, ChatConfig, ClientError};
pub use crypto::{generate_keypair, CodecError, KeyPair, DEFAULT_KEY_BITS};
pub use directory::{DirectoryError, KeyDirectoryClient};
pub use session::{ChatSession, LineOutcome};
pub use transport::{chat_url, MockTransport, Transport, TransportError, WsTransport};
