//! HTTP endpoints for chat-relay.
//!
//! Provides the chat WebSocket, the public key directory, health checks
//! and metrics.

pub mod health;
mod keys;
mod metrics;
mod ws;

use crate::server::ChatRelay;
use axum::{routing::get, Extension, Router};
use std::sync::Arc;

pub use health::HealthStatus;
pub use ws::WsConnection;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<ChatRelay>) -> Router {
    let mut router = Router::new()
        .route("/chat", get(ws::chat_handler))
        .route("/users/:username/key", get(keys::public_key_handler))
        .route("/health", get(health::health_handler));

    if relay.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(relay))
}
