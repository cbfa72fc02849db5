//! Counters and the admin HTTP surface.
//!
//! Counts are kept twice on purpose: plain atomics for the one-shot JSON
//! snapshot, and the `metrics` facade for whatever recorder the binary
//! installs (Prometheus in `main`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::proxy::ProxyState;

#[derive(Debug, Default)]
pub struct ProxyStats {
    connections_total: AtomicU64,
    active_sessions: AtomicU64,
    commands_forwarded: AtomicU64,
    commands_rewritten: AtomicU64,
    commands_blocked: AtomicU64,
    scan_replies_filtered: AtomicU64,
}

impl ProxyStats {
    pub fn session_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("proxy_connections_total").increment(1);
        metrics::gauge!("proxy_active_sessions").increment(1.0);
    }

    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!("proxy_active_sessions").decrement(1.0);
    }

    pub fn command_forwarded(&self) {
        self.commands_forwarded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("proxy_commands_forwarded_total").increment(1);
    }

    pub fn command_rewritten(&self) {
        self.commands_rewritten.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("proxy_commands_rewritten_total").increment(1);
    }

    pub fn command_blocked(&self) {
        self.commands_blocked.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("proxy_commands_blocked_total").increment(1);
    }

    pub fn scan_reply_filtered(&self) {
        self.scan_replies_filtered.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("proxy_scan_replies_filtered_total").increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            commands_forwarded: self.commands_forwarded.load(Ordering::Relaxed),
            commands_rewritten: self.commands_rewritten.load(Ordering::Relaxed),
            commands_blocked: self.commands_blocked.load(Ordering::Relaxed),
            scan_replies_filtered: self.scan_replies_filtered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub connections_total: u64,
    pub active_sessions: u64,
    pub commands_forwarded: u64,
    pub commands_rewritten: u64,
    pub commands_blocked: u64,
    pub scan_replies_filtered: u64,
}

/// Build the admin router: Prometheus render plus a one-shot JSON
/// snapshot of counters and configuration.
pub fn admin_router(state: Arc<ProxyState>, prom: PrometheusHandle) -> Router {
    Router::new()
        .route(
            "/metrics",
            get(move || {
                let handle = prom.clone();
                async move { handle.render() }
            }),
        )
        .route("/api/stats", get(stats_handler))
        .with_state(state)
}

async fn stats_handler(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "stats": state.stats.snapshot(),
        "config": &state.config,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counter_updates() {
        let stats = ProxyStats::default();
        stats.session_opened();
        stats.session_opened();
        stats.session_closed();
        stats.command_forwarded();
        stats.command_rewritten();
        stats.command_blocked();
        stats.scan_reply_filtered();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_total, 2);
        assert_eq!(snapshot.active_sessions, 1);
        assert_eq!(snapshot.commands_forwarded, 1);
        assert_eq!(snapshot.commands_rewritten, 1);
        assert_eq!(snapshot.commands_blocked, 1);
        assert_eq!(snapshot.scan_replies_filtered, 1);
    }
}
