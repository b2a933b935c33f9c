//! JSON frames exchanged between clients and the relay.
//!
//! Ciphertext travels as standard base64 inside the JSON text frame. The
//! relay never looks inside it.

use serde::{Deserialize, Serialize};

use crate::{FrameError, MessageId, UserId};

/// Client → relay: one encrypted message for a named peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Handle of the intended receiver.
    pub receiver_username: String,
    /// Chunked ciphertext (opaque to the relay).
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

impl InboundFrame {
    /// Create a new inbound frame.
    pub fn new(receiver_username: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            receiver_username: receiver_username.into(),
            content,
        }
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(FrameError::Serialization)
    }

    /// Parse from raw JSON bytes.
    ///
    /// Empty content is rejected here: no valid ciphertext blob is empty.
    pub fn from_json(bytes: &[u8]) -> Result<Self, FrameError> {
        let frame: Self =
            serde_json::from_slice(bytes).map_err(|e| FrameError::InvalidFormat {
                reason: e.to_string(),
            })?;
        if frame.receiver_username.is_empty() {
            return Err(FrameError::InvalidFormat {
                reason: "empty receiver_username".into(),
            });
        }
        if frame.content.is_empty() {
            return Err(FrameError::InvalidFormat {
                reason: "empty content".into(),
            });
        }
        Ok(frame)
    }
}

/// Relay → client: a persisted message being pushed to a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Ledger-assigned message id.
    pub id: MessageId,
    /// Identity of the original sender.
    pub sender_id: UserId,
    /// Handle of the original sender.
    pub sender_username: String,
    /// Chunked ciphertext, exactly as the sender submitted it.
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    /// Unix timestamp (milliseconds) when the ledger stored the message.
    pub created_at: i64,
    /// Delivery flag as stored at the time of the push.
    pub delivered: bool,
}

impl OutboundFrame {
    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(FrameError::Serialization)
    }

    /// Parse from raw JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, FrameError> {
        serde_json::from_slice(bytes).map_err(|e| FrameError::InvalidFormat {
            reason: e.to_string(),
        })
    }
}

/// Key directory entry served over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Handle the key belongs to.
    pub username: String,
    /// PEM-encoded RSA public key.
    pub public_key: String,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
