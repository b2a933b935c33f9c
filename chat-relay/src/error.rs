//! Error types for chat-relay.

use chat_types::{ErrorKind, UserId};
use std::path::PathBuf;

/// Main error type for chat-relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back to a domain value.
    #[error("corrupt row: {reason}")]
    Corrupt {
        /// What was wrong with the row.
        reason: String,
    },

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Failure to push one frame to one live connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The connection is already closed.
    #[error("connection closed")]
    Closed,

    /// The write itself failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}

impl TransportError {
    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TransportError
    }
}

/// Errors that abort relaying a single inbound frame.
///
/// None of these close the sender's connection.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The frame could not be parsed or violated a limit.
    #[error("invalid frame: {reason}")]
    InvalidFormat {
        /// Reason the frame is invalid.
        reason: String,
    },

    /// The receiver handle does not resolve to an identity.
    #[error("unknown receiver: {handle}")]
    NotFound {
        /// Handle that failed to resolve.
        handle: String,
    },

    /// No accepted connection exists between the two parties.
    #[error("no accepted connection between {sender} and {receiver}")]
    Unauthorized {
        /// Sending identity.
        sender: UserId,
        /// Intended receiver.
        receiver: UserId,
    },

    /// The ledger or directory failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StorageError),
}

impl DeliveryError {
    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Persistence(_) => ErrorKind::PersistenceError,
        }
    }
}

impl From<chat_types::FrameError> for DeliveryError {
    fn from(err: chat_types::FrameError) -> Self {
        Self::InvalidFormat {
            reason: err.to_string(),
        }
    }
}

/// The dispatch queue no longer accepts frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("dispatcher is shut down")]
pub struct DispatchClosed;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
