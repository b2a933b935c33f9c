//! Error types for pairchat.

use std::fmt;
use thiserror::Error;

/// Classification shared by every error the relay and client can raise.
///
/// Concrete error enums in the other crates expose a `kind()` so logs and
/// metrics can be labelled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown handle or identity.
    NotFound,
    /// No accepted connection between the two parties.
    Unauthorized,
    /// Malformed frame or corrupt chunk header.
    InvalidFormat,
    /// The asymmetric primitive rejected a block.
    DecryptError,
    /// Zero-length plaintext handed to the encoder.
    EmptyMessage,
    /// Read or write failure on a connection.
    TransportError,
    /// Store unavailable or a write failed.
    PersistenceError,
}

impl ErrorKind {
    /// Stable snake_case label for log fields and metric names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::InvalidFormat => "invalid_format",
            Self::DecryptError => "decrypt_error",
            Self::EmptyMessage => "empty_message",
            Self::TransportError => "transport_error",
            Self::PersistenceError => "persistence_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while parsing or producing wire frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame could not be parsed.
    #[error("invalid frame: {reason}")]
    InvalidFormat {
        /// What was wrong with it.
        reason: String,
    },

    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl FrameError {
    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidFormat
    }
}
