//! Prometheus metrics endpoint.

use crate::server::{ChatRelay, RelayMetrics};
use crate::storage::MessageLedger;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::fmt::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Gauges describe current state; counters are monotonic since startup.
pub async fn metrics_handler(Extension(relay): Extension<Arc<ChatRelay>>) -> impl IntoResponse {
    let registry = relay.registry();
    // Best effort: a failing ledger query reports zero
    let stored = relay.storage().total_messages().await.unwrap_or(0);

    let mut body = String::new();
    push_metric(
        &mut body,
        "chat_relay_connections_active",
        "gauge",
        "Live WebSocket connections",
        registry.total_connections() as u64,
    );
    push_metric(
        &mut body,
        "chat_relay_users_online",
        "gauge",
        "Identities with at least one live connection",
        registry.total_identities() as u64,
    );
    push_metric(
        &mut body,
        "chat_relay_ledger_messages",
        "gauge",
        "Messages currently in the ledger",
        stored,
    );
    let _ = writeln!(
        body,
        "# HELP chat_relay_info Server information\n# TYPE chat_relay_info gauge\nchat_relay_info{{version=\"{}\"}} 1\n",
        env!("CARGO_PKG_VERSION")
    );
    render_counters(&mut body, relay.metrics());

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

fn render_counters(body: &mut String, m: &RelayMetrics) {
    let counters = [
        ("frames_received", "Inbound frames handed to the relay", &m.frames_received),
        ("messages_stored", "Messages appended to the ledger", &m.messages_stored),
        ("messages_delivered", "Messages delivered on first attempt", &m.messages_delivered),
        ("catchup_delivered", "Pending messages flushed by catch-up", &m.catchup_delivered),
        ("dropped_invalid", "Frames dropped as malformed", &m.dropped_invalid),
        ("dropped_not_found", "Frames dropped for unknown receivers", &m.dropped_not_found),
        ("dropped_unauthorized", "Frames dropped between unpaired users", &m.dropped_unauthorized),
        ("push_failures", "Failed pushes to a single connection", &m.push_failures),
        ("persistence_errors", "Failed ledger or directory operations", &m.persistence_errors),
        ("connections", "WebSocket sessions accepted", &m.connections_total),
    ];

    for (name, help, counter) in counters {
        push_metric(
            body,
            &format!("chat_relay_{name}_total"),
            "counter",
            help,
            counter.load(Ordering::Relaxed),
        );
    }
}

fn push_metric(body: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    let _ = writeln!(body, "# HELP {name} {help}\n# TYPE {name} {kind}\n{name} {value}\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_in_prometheus_format() {
        let metrics = RelayMetrics::default();
        metrics.dropped_unauthorized.fetch_add(3, Ordering::Relaxed);

        let mut body = String::new();
        render_counters(&mut body, &metrics);

        assert!(body.contains("# TYPE chat_relay_dropped_unauthorized_total counter"));
        assert!(body.contains("chat_relay_dropped_unauthorized_total 3\n"));
        assert!(body.contains("chat_relay_connections_total 0\n"));
    }
}
