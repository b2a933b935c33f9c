//! Identity and ordering types for pairchat.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable numeric identity of a user.
///
/// Resolved from a human-readable handle by the identity service; the
/// relay only ever references it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    /// Create a UserId from its raw value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

/// Ledger-assigned message identifier.
///
/// Monotonically increasing, assigned once when the message is persisted.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Create a MessageId from its raw value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&UserId::new(42)).unwrap();
        assert_eq!(json, "42");

        let restored: UserId = serde_json::from_str("7").unwrap();
        assert_eq!(restored, UserId::new(7));
    }

    #[test]
    fn message_id_ordering() {
        let m1 = MessageId::new(100);
        let m2 = MessageId::new(200);
        assert!(m1 < m2);
        assert_eq!(m2.value(), 200);
    }

    #[test]
    fn debug_is_compact() {
        assert_eq!(format!("{:?}", UserId::new(3)), "UserId(3)");
        assert_eq!(format!("{:?}", MessageId::new(9)), "MessageId(9)");
        assert_eq!(UserId::from(5).to_string(), "5");
    }
}
