//! `GET /health`: liveness plus a snapshot of who is connected.
//!
//! Counts come straight from the connection registry, so a user with two
//! devices contributes two connections but one online user.

use crate::server::ChatRelay;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Process start, set by the binary before serving.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Record the start instant. Later calls keep the first value.
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Always `"ok"` while the relay can answer.
    pub status: String,
    /// Crate version of the running relay.
    pub version: String,
    /// Live WebSocket connections.
    pub connections: usize,
    /// Identities with at least one live connection.
    pub online_users: usize,
    /// Seconds since [`init_start_time`], 0 if it was never called.
    pub uptime_seconds: u64,
}

/// Report registry counts and uptime.
pub async fn health_handler(Extension(relay): Extension<Arc<ChatRelay>>) -> Json<HealthStatus> {
    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: relay.registry().total_connections(),
        online_users: relay.registry().total_identities(),
        uptime_seconds: uptime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::tests::MockConnection;
    use crate::registry::PeerConnection;
    use crate::storage::SqliteStorage;
    use chat_types::UserId;

    async fn relay() -> Arc<ChatRelay> {
        let storage = SqliteStorage::in_memory().await.unwrap();
        Arc::new(ChatRelay::new(Config::default(), storage))
    }

    #[tokio::test]
    async fn idle_relay_reports_nobody_online() {
        let Json(status) = health_handler(Extension(relay().await)).await;

        assert_eq!(status.status, "ok");
        assert_eq!(status.connections, 0);
        assert_eq!(status.online_users, 0);
    }

    #[tokio::test]
    async fn multi_device_user_counts_once_as_online() {
        let relay = relay().await;
        let (alice, bob) = (UserId::new(1), UserId::new(2));
        let phone = MockConnection::new();
        relay.registry().register(alice, phone.clone());
        relay.registry().register(alice, MockConnection::new());
        relay.registry().register(bob, MockConnection::new());

        let Json(status) = health_handler(Extension(relay.clone())).await;
        assert_eq!(status.connections, 3);
        assert_eq!(status.online_users, 2);

        relay.registry().unregister(alice, phone.id());
        let Json(status) = health_handler(Extension(relay)).await;
        assert_eq!(status.connections, 2);
        assert_eq!(status.online_users, 2);
    }

    #[test]
    fn body_uses_snake_case_fields() {
        let status = HealthStatus {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connections: 2,
            online_users: 1,
            uptime_seconds: 5,
        };

        let json: serde_json::Value = serde_json::to_value(&status).unwrap();
        assert_eq!(json["online_users"], 1);
        assert_eq!(json["connections"], 2);
        assert_eq!(json["uptime_seconds"], 5);
    }
}
