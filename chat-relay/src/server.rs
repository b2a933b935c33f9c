//! Main ChatRelay server coordination.
//!
//! ChatRelay owns storage, the live connection registry, the message relay
//! and the dispatch pool. One instance per process (or per test).

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::registry::ConnectionRegistry;
use crate::relay::MessageRelay;
use crate::storage::SqliteStorage;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Inbound frames handed to the relay.
    pub frames_received: AtomicU64,
    /// Messages appended to the ledger.
    pub messages_stored: AtomicU64,
    /// Messages marked delivered by primary delivery.
    pub messages_delivered: AtomicU64,
    /// Pending messages flushed by catch-up.
    pub catchup_delivered: AtomicU64,
    /// Frames dropped as malformed or oversized.
    pub dropped_invalid: AtomicU64,
    /// Frames dropped because the receiver handle is unknown.
    pub dropped_not_found: AtomicU64,
    /// Frames dropped because the parties are not connected.
    pub dropped_unauthorized: AtomicU64,
    /// Individual pushes that failed on a connection.
    pub push_failures: AtomicU64,
    /// Ledger or directory operations that failed.
    pub persistence_errors: AtomicU64,
    /// WebSocket sessions accepted.
    pub connections_total: AtomicU64,
}

/// Main relay server.
pub struct ChatRelay {
    config: Config,
    storage: Arc<SqliteStorage>,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<RelayMetrics>,
    relay: Arc<MessageRelay>,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for ChatRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRelay")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl ChatRelay {
    /// Create a relay over `storage` and start its dispatch workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: Config, storage: SqliteStorage) -> Self {
        let storage = Arc::new(storage);
        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(RelayMetrics::default());

        let relay = Arc::new(MessageRelay::new(
            storage.clone(),
            storage.clone(),
            registry.clone(),
            metrics.clone(),
            config.storage.max_content_size,
        ));

        let dispatcher = Dispatcher::spawn(
            relay.clone(),
            config.dispatch.workers,
            config.dispatch.queue_capacity,
        );

        Self {
            config,
            storage,
            registry,
            metrics,
            relay,
            dispatcher,
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the storage layer.
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Live connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// The per-frame relay logic.
    pub fn relay(&self) -> &Arc<MessageRelay> {
        &self.relay
    }

    /// Inbound frame queue.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Stop accepting frames and wait for queued ones to finish.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}
