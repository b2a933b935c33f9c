//! SQLite storage backend for chat-relay.

use super::{BoundIdentity, IdentityService, KeyDirectory, MessageLedger, NewMessage, StoredMessage};
use crate::error::StorageError;
use async_trait::async_trait;
use chat_types::{MessageId, UserId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// SQLite-backed ledger, identity service and key directory.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("connections", &self.pool.size())
            .finish_non_exhaustive()
    }
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let path_str = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let options = SqliteConnectOptions::from_str(path_str)
            .map_err(StorageError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                public_key TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id INTEGER NOT NULL REFERENCES users(id),
                receiver_id INTEGER NOT NULL REFERENCES users(id),
                status TEXT NOT NULL CHECK (status IN ('pending', 'accepted')),
                created_at INTEGER NOT NULL,
                CHECK (sender_id != receiver_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_tokens (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id INTEGER NOT NULL,
                receiver_id INTEGER NOT NULL,
                content BLOB NOT NULL,
                delivered INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        // One connection record per unordered pair
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_connections_pair
            ON connections(min(sender_id, receiver_id), max(sender_id, receiver_id))
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_pending
            ON messages(sender_id, receiver_id, delivered, created_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_receiver ON messages(receiver_id, delivered)")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(())
    }

    /// Register a user with their PEM public key.
    ///
    /// Account creation proper (passwords, validation) happens elsewhere;
    /// this is the provisioning hook the relay needs.
    pub async fn create_user(&self, username: &str, public_key: &str) -> Result<UserId, StorageError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (username, public_key, created_at)
            VALUES (?1, ?2, ?3)
            RETURNING id
            "#,
        )
        .bind(username)
        .bind(public_key)
        .bind(Self::current_timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        user_id_from_row(id)
    }

    /// Record a pending connection request from `from` to `to`.
    ///
    /// Fails if any record already exists for the pair, in either direction.
    pub async fn request_connection(&self, from: UserId, to: UserId) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO connections (sender_id, receiver_id, status, created_at)
            VALUES (?1, ?2, 'pending', ?3)
            "#,
        )
        .bind(from.value() as i64)
        .bind(to.value() as i64)
        .bind(Self::current_timestamp())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    /// Accept the pending request `requester` sent to `responder`.
    ///
    /// Only the receiving side can accept. Returns false if there was no
    /// such pending request.
    pub async fn accept_connection(
        &self,
        requester: UserId,
        responder: UserId,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE connections SET status = 'accepted'
            WHERE sender_id = ?1 AND receiver_id = ?2 AND status = 'pending'
            "#,
        )
        .bind(requester.value() as i64)
        .bind(responder.value() as i64)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Bind an externally issued session token to a user.
    pub async fn insert_session_token(&self, token: &str, user: UserId) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO session_tokens (token, user_id, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(token) DO UPDATE SET user_id = ?2, created_at = ?3
            "#,
        )
        .bind(token)
        .bind(user.value() as i64)
        .bind(Self::current_timestamp())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    fn current_timestamp() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageLedger for SqliteStorage {
    async fn append(&self, msg: NewMessage) -> Result<StoredMessage, StorageError> {
        let created_at = Self::current_timestamp();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO messages (sender_id, receiver_id, content, delivered, created_at)
            VALUES (?1, ?2, ?3, 0, ?4)
            RETURNING id
            "#,
        )
        .bind(msg.sender_id.value() as i64)
        .bind(msg.receiver_id.value() as i64)
        .bind(&msg.content)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(StoredMessage {
            id: message_id_from_row(id)?,
            sender_id: msg.sender_id,
            receiver_id: msg.receiver_id,
            content: msg.content,
            delivered: false,
            created_at,
        })
    }

    async fn pending_between(
        &self,
        sender: UserId,
        receiver: UserId,
    ) -> Result<Vec<StoredMessage>, StorageError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, sender_id, receiver_id, content, delivered, created_at
            FROM messages
            WHERE sender_id = ?1 AND receiver_id = ?2 AND delivered = 0
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(sender.value() as i64)
        .bind(receiver.value() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn mark_delivered(&self, id: MessageId) -> Result<(), StorageError> {
        sqlx::query("UPDATE messages SET delivered = 1 WHERE id = ?1 AND delivered = 0")
            .bind(id.value() as i64)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<StoredMessage>, StorageError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, sender_id, receiver_id, content, delivered, created_at
            FROM messages
            WHERE id = ?1
            "#,
        )
        .bind(id.value() as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        match row {
            Some(r) => Ok(Some(r.try_into()?)),
            None => Ok(None),
        }
    }

    async fn pending_count(&self, receiver: UserId) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE receiver_id = ?1 AND delivered = 0",
        )
        .bind(receiver.value() as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(count as u64)
    }

    async fn total_messages(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(count as u64)
    }
}

#[async_trait]
impl IdentityService for SqliteStorage {
    async fn resolve_identity(&self, handle: &str) -> Result<Option<UserId>, StorageError> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        id.map(user_id_from_row).transpose()
    }

    async fn is_authorized(&self, a: UserId, b: UserId) -> Result<bool, StorageError> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM connections
            WHERE ((sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1))
              AND status = 'accepted'
            LIMIT 1
            "#,
        )
        .bind(a.value() as i64)
        .bind(b.value() as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(found.is_some())
    }

    async fn authenticate(&self, token: &str) -> Result<Option<BoundIdentity>, StorageError> {
        let row: Option<(i64, String)> = sqlx::query_as(
            r#"
            SELECT u.id, u.username
            FROM session_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.token = ?1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        match row {
            Some((id, username)) => Ok(Some(BoundIdentity {
                id: user_id_from_row(id)?,
                username,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl KeyDirectory for SqliteStorage {
    async fn public_key_for(&self, handle: &str) -> Result<Option<String>, StorageError> {
        sqlx::query_scalar("SELECT public_key FROM users WHERE username = ?1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Database)
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    sender_id: i64,
    receiver_id: i64,
    content: Vec<u8>,
    delivered: bool,
    created_at: i64,
}

impl TryFrom<MessageRow> for StoredMessage {
    type Error = StorageError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(StoredMessage {
            id: message_id_from_row(row.id)?,
            sender_id: user_id_from_row(row.sender_id)?,
            receiver_id: user_id_from_row(row.receiver_id)?,
            content: row.content,
            delivered: row.delivered,
            created_at: row.created_at,
        })
    }
}

fn user_id_from_row(id: i64) -> Result<UserId, StorageError> {
    u64::try_from(id)
        .map(UserId::new)
        .map_err(|_| StorageError::Corrupt {
            reason: format!("negative user id {id}"),
        })
}

fn message_id_from_row(id: i64) -> Result<MessageId, StorageError> {
    u64::try_from(id)
        .map(MessageId::new)
        .map_err(|_| StorageError::Corrupt {
            reason: format!("negative message id {id}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEM: &str = "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n";

    fn new_message(sender: UserId, receiver: UserId, content: &[u8]) -> NewMessage {
        NewMessage {
            sender_id: sender,
            receiver_id: receiver,
            content: content.to_vec(),
        }
    }

    async fn storage_with_pair() -> (SqliteStorage, UserId, UserId) {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let alice = storage.create_user("alice", PEM).await.unwrap();
        let bob = storage.create_user("bob", PEM).await.unwrap();
        (storage, alice, bob)
    }

    #[tokio::test]
    async fn append_assigns_monotonic_ids() {
        let (storage, alice, bob) = storage_with_pair().await;

        let m1 = storage.append(new_message(alice, bob, b"one")).await.unwrap();
        let m2 = storage.append(new_message(alice, bob, b"two")).await.unwrap();
        let m3 = storage.append(new_message(bob, alice, b"three")).await.unwrap();

        assert!(m1.id < m2.id);
        assert!(m2.id < m3.id);
        assert!(!m1.delivered);
        assert_eq!(storage.total_messages().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn pending_between_is_directional_and_ordered() {
        let (storage, alice, bob) = storage_with_pair().await;

        let first = storage.append(new_message(bob, alice, b"first")).await.unwrap();
        storage.append(new_message(alice, bob, b"other way")).await.unwrap();
        let second = storage.append(new_message(bob, alice, b"second")).await.unwrap();

        let pending = storage.pending_between(bob, alice).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(pending[0].content, b"first");
    }

    #[tokio::test]
    async fn mark_delivered_removes_from_pending() {
        let (storage, alice, bob) = storage_with_pair().await;

        let msg = storage.append(new_message(alice, bob, b"hi")).await.unwrap();
        assert_eq!(storage.pending_count(bob).await.unwrap(), 1);

        storage.mark_delivered(msg.id).await.unwrap();

        assert_eq!(storage.pending_count(bob).await.unwrap(), 0);
        assert!(storage.pending_between(alice, bob).await.unwrap().is_empty());
        let stored = storage.get_message(msg.id).await.unwrap().unwrap();
        assert!(stored.delivered);
    }

    #[tokio::test]
    async fn mark_delivered_is_idempotent() {
        let (storage, alice, bob) = storage_with_pair().await;

        let msg = storage.append(new_message(alice, bob, b"hi")).await.unwrap();
        storage.mark_delivered(msg.id).await.unwrap();
        storage.mark_delivered(msg.id).await.unwrap();

        assert!(storage.get_message(msg.id).await.unwrap().unwrap().delivered);
    }

    #[tokio::test]
    async fn get_message_missing_is_none() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        assert!(storage.get_message(MessageId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resolve_identity_by_handle() {
        let (storage, alice, _) = storage_with_pair().await;

        assert_eq!(storage.resolve_identity("alice").await.unwrap(), Some(alice));
        assert_eq!(storage.resolve_identity("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let (storage, _, _) = storage_with_pair().await;
        assert!(storage.create_user("alice", PEM).await.is_err());
    }

    #[tokio::test]
    async fn authorization_requires_accepted_connection() {
        let (storage, alice, bob) = storage_with_pair().await;

        assert!(!storage.is_authorized(alice, bob).await.unwrap());

        storage.request_connection(alice, bob).await.unwrap();
        assert!(!storage.is_authorized(alice, bob).await.unwrap(), "pending is not enough");

        // Only the receiving side can accept
        assert!(!storage.accept_connection(bob, alice).await.unwrap());
        assert!(storage.accept_connection(alice, bob).await.unwrap());

        // Order-independent
        assert!(storage.is_authorized(alice, bob).await.unwrap());
        assert!(storage.is_authorized(bob, alice).await.unwrap());
    }

    #[tokio::test]
    async fn one_connection_record_per_pair() {
        let (storage, alice, bob) = storage_with_pair().await;

        storage.request_connection(alice, bob).await.unwrap();
        assert!(storage.request_connection(bob, alice).await.is_err());
        assert!(storage.request_connection(alice, alice).await.is_err());
    }

    #[tokio::test]
    async fn authenticate_maps_token_to_identity() {
        let (storage, alice, _) = storage_with_pair().await;

        storage.insert_session_token("tok-a", alice).await.unwrap();

        let bound = storage.authenticate("tok-a").await.unwrap().unwrap();
        assert_eq!(bound.id, alice);
        assert_eq!(bound.username, "alice");
        assert!(storage.authenticate("forged").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn public_key_lookup() {
        let (storage, _, _) = storage_with_pair().await;

        assert_eq!(storage.public_key_for("bob").await.unwrap().as_deref(), Some(PEM));
        assert!(storage.public_key_for("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_backed_storage_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        {
            let storage = SqliteStorage::new(&path).await.unwrap();
            let alice = storage.create_user("alice", PEM).await.unwrap();
            let bob = storage.create_user("bob", PEM).await.unwrap();
            storage.append(new_message(alice, bob, b"kept")).await.unwrap();
        }

        let reopened = SqliteStorage::new(&path).await.unwrap();
        assert_eq!(reopened.total_messages().await.unwrap(), 1);
        let bob = reopened.resolve_identity("bob").await.unwrap().unwrap();
        assert_eq!(reopened.pending_count(bob).await.unwrap(), 1);
    }
}
