//! Live connection registry.
//!
//! Maps each identity to the set of transport sessions it currently has
//! open (one per device). Each mutation swaps in a freshly built set, so a
//! [`ConnectionRegistry::lookup`] snapshot is never partially built and no
//! lock is held while frames are pushed to it.

use crate::error::TransportError;
use async_trait::async_trait;
use chat_types::UserId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-local identifier for one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Allocate a fresh, never-reused id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value, for logging.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A live transport session the relay can push frames to.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Stable id of this connection.
    fn id(&self) -> ConnectionId;

    /// Write one text frame. A failure affects only this connection.
    async fn send_text(&self, text: String) -> Result<(), TransportError>;
}

/// Snapshot of an identity's live connections.
pub type ConnectionSet = Arc<[Arc<dyn PeerConnection>]>;

/// Identity → live connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: DashMap<UserId, ConnectionSet>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("identities", &self.entries.len())
            .finish()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` to the identity's set, creating the set if needed.
    ///
    /// Registering the same connection twice is a no-op.
    pub fn register(&self, identity: UserId, conn: Arc<dyn PeerConnection>) {
        let conn_id = conn.id();
        match self.entries.entry(identity) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if current.iter().any(|c| c.id() == conn_id) {
                    return;
                }
                let next: ConnectionSet = current
                    .iter()
                    .cloned()
                    .chain(std::iter::once(conn))
                    .collect();
                occupied.insert(next);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::from(vec![conn]));
            }
        }

        tracing::debug!(user = %identity, conn = %conn_id, "registered connection");
    }

    /// Remove the connection; drop the identity entirely once its set is empty.
    ///
    /// Returns true if the connection was registered.
    pub fn unregister(&self, identity: UserId, conn_id: ConnectionId) -> bool {
        let Entry::Occupied(mut occupied) = self.entries.entry(identity) else {
            return false;
        };

        let current = occupied.get();
        if !current.iter().any(|c| c.id() == conn_id) {
            return false;
        }

        let remaining: Vec<Arc<dyn PeerConnection>> = current
            .iter()
            .filter(|c| c.id() != conn_id)
            .cloned()
            .collect();

        if remaining.is_empty() {
            occupied.remove();
        } else {
            occupied.insert(Arc::from(remaining));
        }

        tracing::debug!(user = %identity, conn = %conn_id, "unregistered connection");
        true
    }

    /// Current connections of `identity` (empty if offline).
    pub fn lookup(&self, identity: UserId) -> ConnectionSet {
        self.entries
            .get(&identity)
            .map(|set| Arc::clone(set.value()))
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Whether `identity` has an entry at all.
    pub fn is_online(&self, identity: UserId) -> bool {
        self.entries.contains_key(&identity)
    }

    /// Number of live connections for one identity.
    pub fn connection_count(&self, identity: UserId) -> usize {
        self.entries.get(&identity).map(|set| set.len()).unwrap_or(0)
    }

    /// Live connections across all identities.
    pub fn total_connections(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().len()).sum()
    }

    /// Identities with at least one live connection.
    pub fn total_identities(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Connection that records frames, or fails every send when told to.
    pub(crate) struct MockConnection {
        id: ConnectionId,
        fail: bool,
        sent: Mutex<Vec<String>>,
    }

    impl MockConnection {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::next(),
                fail: false,
                sent: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn failing() -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::next(),
                fail: true,
                sent: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PeerConnection for MockConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }

        async fn send_text(&self, text: String) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::SendFailed("mock failure".into()));
            }
            self.sent.lock().unwrap().push(text);
            Ok(())
        }
    }

    fn ids(set: &ConnectionSet) -> Vec<ConnectionId> {
        set.iter().map(|c| c.id()).collect()
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("conn-"));
    }

    #[test]
    fn lookup_unknown_identity_is_empty() {
        let registry = ConnectionRegistry::new();
        assert!(registry.lookup(UserId::new(7)).is_empty());
        assert!(!registry.is_online(UserId::new(7)));
    }

    #[test]
    fn register_supports_multiple_devices() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new(1);
        let phone = MockConnection::new();
        let laptop = MockConnection::new();

        registry.register(user, phone.clone());
        registry.register(user, laptop.clone());
        registry.register(user, phone.clone());

        assert_eq!(ids(&registry.lookup(user)), vec![phone.id(), laptop.id()]);
        assert_eq!(registry.connection_count(user), 2);
        assert_eq!(registry.total_connections(), 2);
        assert_eq!(registry.total_identities(), 1);
    }

    #[test]
    fn unregister_all_removes_identity() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new(1);
        let conns: Vec<_> = (0..5).map(|_| MockConnection::new()).collect();

        for conn in &conns {
            registry.register(user, conn.clone());
        }
        for conn in &conns {
            assert!(registry.unregister(user, conn.id()));
        }

        assert!(!registry.is_online(user));
        assert_eq!(registry.total_identities(), 0);
        assert!(!registry.unregister(user, conns[0].id()));
    }

    #[test]
    fn snapshot_is_unaffected_by_later_mutation() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new(1);
        let first = MockConnection::new();
        let second = MockConnection::new();

        registry.register(user, first.clone());
        let snapshot = registry.lookup(user);
        registry.register(user, second.clone());
        registry.unregister(user, first.id());

        assert_eq!(ids(&snapshot), vec![first.id()]);
        assert_eq!(ids(&registry.lookup(user)), vec![second.id()]);
    }

    #[test]
    fn unregister_under_wrong_identity_is_noop() {
        let registry = ConnectionRegistry::new();
        let conn = MockConnection::new();
        registry.register(UserId::new(1), conn.clone());

        assert!(!registry.unregister(UserId::new(2), conn.id()));
        assert_eq!(registry.connection_count(UserId::new(1)), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_register_unregister_lookup() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut handles = Vec::new();

        for task in 0..16u64 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let user = UserId::new(task % 4);
                for _ in 0..200 {
                    let conn = MockConnection::new();
                    let conn_id = conn.id();
                    registry.register(user, conn);
                    assert!(ids(&registry.lookup(user)).contains(&conn_id));
                    assert!(registry.unregister(user, conn_id));
                    // Our own connection is gone from every later snapshot
                    assert!(!ids(&registry.lookup(user)).contains(&conn_id));
                    tokio::task::yield_now().await;
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.total_identities(), 0);
        assert_eq!(registry.total_connections(), 0);
    }
}
