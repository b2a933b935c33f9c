//! Per-frame relay logic.
//!
//! For one inbound frame from a bound connection:
//! 1. parse and size-check the frame
//! 2. resolve the receiver handle
//! 3. require an accepted connection between the two parties
//! 4. append the message to the ledger
//! 5. catch-up: flush the receiver's pending messages to the sender
//! 6. push the new message to the receiver's live connections
//!
//! Nothing is ever sent back to the sender about failures.

use crate::error::DeliveryError;
use crate::registry::{ConnectionRegistry, ConnectionSet};
use crate::server::RelayMetrics;
use crate::storage::{BoundIdentity, IdentityService, MessageLedger, NewMessage, StoredMessage};
use chat_types::{ErrorKind, InboundFrame, MessageId, UserId};
use futures_util::future::join_all;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// What happened to one successfully relayed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Ledger id of the new message.
    pub message_id: MessageId,
    /// Pending messages flushed to the sender by catch-up.
    pub caught_up: usize,
    /// Whether at least one receiver connection got the new message.
    pub delivered: bool,
}

/// Relays inbound frames between paired identities.
pub struct MessageRelay {
    ledger: Arc<dyn MessageLedger>,
    identities: Arc<dyn IdentityService>,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<RelayMetrics>,
    max_content_size: usize,
}

impl std::fmt::Debug for MessageRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRelay")
            .field("registry", &self.registry)
            .field("max_content_size", &self.max_content_size)
            .finish_non_exhaustive()
    }
}

impl MessageRelay {
    /// Create a relay over the given collaborators.
    pub fn new(
        ledger: Arc<dyn MessageLedger>,
        identities: Arc<dyn IdentityService>,
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<RelayMetrics>,
        max_content_size: usize,
    ) -> Self {
        Self {
            ledger,
            identities,
            registry,
            metrics,
            max_content_size,
        }
    }

    /// Relay one raw frame received on a connection bound to `sender`.
    ///
    /// Errors are logged and counted here; callers may ignore them. None of
    /// them affect the sender's connection.
    pub async fn handle_frame(
        &self,
        sender: &BoundIdentity,
        raw: &[u8],
    ) -> Result<RelayOutcome, DeliveryError> {
        self.metrics.frames_received.fetch_add(1, Ordering::Relaxed);

        let result = self.relay(sender, raw).await;
        if let Err(e) = &result {
            self.record_failure(sender, e);
        }
        result
    }

    async fn relay(
        &self,
        sender: &BoundIdentity,
        raw: &[u8],
    ) -> Result<RelayOutcome, DeliveryError> {
        let frame = InboundFrame::from_json(raw)?;
        if frame.content.len() > self.max_content_size {
            return Err(DeliveryError::InvalidFormat {
                reason: format!(
                    "content is {} bytes, limit is {}",
                    frame.content.len(),
                    self.max_content_size
                ),
            });
        }

        let receiver_id = self
            .identities
            .resolve_identity(&frame.receiver_username)
            .await?
            .ok_or_else(|| DeliveryError::NotFound {
                handle: frame.receiver_username.clone(),
            })?;

        if !self.identities.is_authorized(sender.id, receiver_id).await? {
            return Err(DeliveryError::Unauthorized {
                sender: sender.id,
                receiver: receiver_id,
            });
        }

        let stored = self
            .ledger
            .append(NewMessage {
                sender_id: sender.id,
                receiver_id,
                content: frame.content,
            })
            .await?;
        self.metrics.messages_stored.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            msg_id = %stored.id,
            from = %sender.id,
            to = %receiver_id,
            bytes = stored.content.len(),
            "stored message"
        );

        let caught_up = self
            .catch_up(sender, receiver_id, &frame.receiver_username)
            .await;
        let delivered = self.deliver(&stored, receiver_id, &sender.username).await;

        Ok(RelayOutcome {
            message_id: stored.id,
            caught_up,
            delivered,
        })
    }

    /// Flush everything `receiver` sent `sender` that is still pending.
    ///
    /// Only runs while the sender has live connections; a reconnect alone
    /// never triggers it.
    async fn catch_up(
        &self,
        sender: &BoundIdentity,
        receiver_id: UserId,
        receiver_username: &str,
    ) -> usize {
        let conns = self.registry.lookup(sender.id);
        if conns.is_empty() {
            return 0;
        }

        let pending = match self.ledger.pending_between(receiver_id, sender.id).await {
            Ok(pending) => pending,
            Err(e) => {
                self.metrics.persistence_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    kind = ErrorKind::PersistenceError.as_str(),
                    user = %sender.id,
                    error = %e,
                    "catch-up query failed"
                );
                return 0;
            }
        };

        let mut flushed = 0;
        for msg in &pending {
            if self.push_and_mark(msg, &conns, receiver_username).await {
                flushed += 1;
            }
        }

        if flushed > 0 {
            self.metrics
                .catchup_delivered
                .fetch_add(flushed as u64, Ordering::Relaxed);
            tracing::debug!(user = %sender.id, from = %receiver_id, flushed, "catch-up flushed");
        }
        flushed
    }

    async fn deliver(&self, stored: &StoredMessage, receiver_id: UserId, sender_username: &str) -> bool {
        let conns = self.registry.lookup(receiver_id);
        if conns.is_empty() {
            tracing::debug!(msg_id = %stored.id, to = %receiver_id, "receiver offline, pending");
            return false;
        }

        let delivered = self.push_and_mark(stored, &conns, sender_username).await;
        if delivered {
            self.metrics.messages_delivered.fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }

    /// Push one message to every connection in `conns`; mark it delivered if
    /// any push succeeded. Returns whether a push succeeded.
    async fn push_and_mark(&self, msg: &StoredMessage, conns: &ConnectionSet, author: &str) -> bool {
        let text = match msg.to_frame(author).to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(msg_id = %msg.id, error = %e, "failed to encode outbound frame");
                return false;
            }
        };

        let results = join_all(conns.iter().map(|conn| {
            let text = text.clone();
            async move { (conn.id(), conn.send_text(text).await) }
        }))
        .await;

        let mut succeeded = false;
        for (conn_id, result) in results {
            match result {
                Ok(()) => succeeded = true,
                Err(e) => {
                    self.metrics.push_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        kind = e.kind().as_str(),
                        conn = %conn_id,
                        msg_id = %msg.id,
                        error = %e,
                        "push failed"
                    );
                }
            }
        }

        if !succeeded {
            return false;
        }

        if let Err(e) = self.ledger.mark_delivered(msg.id).await {
            // Stays pending; a later catch-up delivers it again.
            self.metrics.persistence_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                kind = ErrorKind::PersistenceError.as_str(),
                msg_id = %msg.id,
                error = %e,
                "failed to mark delivered"
            );
        }
        true
    }

    fn record_failure(&self, sender: &BoundIdentity, err: &DeliveryError) {
        let kind = err.kind().as_str();
        match err {
            DeliveryError::InvalidFormat { .. } => {
                self.metrics.dropped_invalid.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind, user = %sender.id, error = %err, "dropped frame");
            }
            DeliveryError::NotFound { .. } => {
                self.metrics.dropped_not_found.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind, user = %sender.id, error = %err, "dropped frame");
            }
            DeliveryError::Unauthorized { .. } => {
                self.metrics.dropped_unauthorized.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind, user = %sender.id, error = %err, "dropped frame");
            }
            DeliveryError::Persistence(_) => {
                self.metrics.persistence_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(kind, user = %sender.id, error = %err, "relay step aborted");
            }
        }
    }
}
