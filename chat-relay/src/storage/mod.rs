//! Storage layer for chat-relay.
//!
//! Three collaborator interfaces live here:
//! - [`MessageLedger`]: durable message records with a one-way `delivered` flag
//! - [`IdentityService`]: handle resolution, pairing checks, session tokens
//! - [`KeyDirectory`]: public keys for handles
//!
//! [`SqliteStorage`] implements all three on one database.

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use chat_types::{MessageId, OutboundFrame, UserId};

/// A message record held by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Ledger-assigned identifier.
    pub id: MessageId,
    /// Identity that sent the message.
    pub sender_id: UserId,
    /// Identity the message is addressed to.
    pub receiver_id: UserId,
    /// Chunked ciphertext (relay cannot decrypt).
    pub content: Vec<u8>,
    /// Whether at least one push to the receiver succeeded.
    pub delivered: bool,
    /// Unix timestamp (milliseconds) when the record was created.
    pub created_at: i64,
}

impl StoredMessage {
    /// Build the frame pushed to a live connection.
    pub fn to_frame(&self, sender_username: &str) -> OutboundFrame {
        OutboundFrame {
            id: self.id,
            sender_id: self.sender_id,
            sender_username: sender_username.to_string(),
            content: self.content.clone(),
            created_at: self.created_at,
            delivered: self.delivered,
        }
    }
}

/// Request to append a new message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Identity that sent the message.
    pub sender_id: UserId,
    /// Identity the message is addressed to.
    pub receiver_id: UserId,
    /// Chunked ciphertext.
    pub content: Vec<u8>,
}

/// The identity a live connection is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundIdentity {
    /// Stable identity.
    pub id: UserId,
    /// Human-readable handle.
    pub username: String,
}

/// Durable store of message records.
///
/// Atomicity of individual operations is the backend's responsibility; the
/// relay adds no locking of its own.
#[async_trait]
pub trait MessageLedger: Send + Sync {
    /// Persist a new message with `delivered = false`.
    async fn append(&self, msg: NewMessage) -> Result<StoredMessage, StorageError>;

    /// All undelivered messages from `sender` to `receiver`, oldest first.
    async fn pending_between(
        &self,
        sender: UserId,
        receiver: UserId,
    ) -> Result<Vec<StoredMessage>, StorageError>;

    /// Flip `delivered` to true. Never flips it back; repeating is a no-op.
    async fn mark_delivered(&self, id: MessageId) -> Result<(), StorageError>;

    /// Get a specific message by ID.
    async fn get_message(&self, id: MessageId) -> Result<Option<StoredMessage>, StorageError>;

    /// Count of undelivered messages addressed to `receiver`.
    async fn pending_count(&self, receiver: UserId) -> Result<u64, StorageError>;

    /// Total number of messages in the ledger.
    async fn total_messages(&self) -> Result<u64, StorageError>;
}

/// Identity and authorization collaborator.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Resolve a handle to its identity, if registered.
    async fn resolve_identity(&self, handle: &str) -> Result<Option<UserId>, StorageError>;

    /// True iff an accepted connection exists between `a` and `b`,
    /// regardless of which side requested it.
    async fn is_authorized(&self, a: UserId, b: UserId) -> Result<bool, StorageError>;

    /// Map a session token to the identity it was issued for.
    async fn authenticate(&self, token: &str) -> Result<Option<BoundIdentity>, StorageError>;
}

/// Public key lookup by handle.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// PEM-encoded public key of `handle`, if registered.
    async fn public_key_for(&self, handle: &str) -> Result<Option<String>, StorageError>;
}
