//! # chat-relay
//!
//! Store-and-forward relay for pairwise encrypted chat.
//!
//! This crate implements a relay server that:
//! - Accepts WebSocket connections bound to an identity by session token
//! - Tracks every live connection per identity (one per device)
//! - Persists each message before pushing it to the receiver's devices
//! - Flushes a peer's undelivered messages when that peer is written to
//! - Never sees plaintext (content is opaque ciphertext)
//!
//! ## Architecture
//!
//! ```text
//! alice (2 devices) ──┐                   ┌── bob
//!                     │   WebSocket /chat │
//!                     ▼                   ▼
//!        ┌──────────────────────────────────────┐
//!        │ read loops → Dispatcher (bounded)    │
//!        │            → MessageRelay            │
//!        │   ConnectionRegistry   SQLite ledger │
//!        └──────────────────────────────────────┘
//! ```
//!
//! ## Frames
//!
//! - client → relay: `{"receiver_username", "content"}`
//! - relay → client: `{"id", "sender_id", "sender_username", "content", "created_at", "delivered"}`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod registry;
pub mod relay;
pub mod server;
pub mod storage;
