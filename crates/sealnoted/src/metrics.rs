//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  - Prometheus text format
//!   GET /healthz  - Liveness probe (always 200 if process is running)
//!   GET /readyz   - Readiness probe (200 if the notes log is reachable)

use std::sync::Arc;

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use sealnote_store::NotesLog;

type Labels = Vec<(String, String)>;

/// Server counters, registered once at startup.
pub struct Metrics {
    registry: Registry,
    events_appended: Family<Labels, Counter>,
    events_rejected: Family<Labels, Counter>,
    fanout_frames: Counter,
    socket_connections: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let events_appended = Family::<Labels, Counter>::default();
        let events_rejected = Family::<Labels, Counter>::default();
        let fanout_frames = Counter::default();
        let socket_connections = Gauge::default();

        registry.register(
            "sealnote_events_appended",
            "Events accepted into a notes log, by kind",
            events_appended.clone(),
        );
        registry.register(
            "sealnote_events_rejected",
            "Append requests rejected by shape validation, by reason",
            events_rejected.clone(),
        );
        registry.register(
            "sealnote_fanout_frames",
            "Socket frames queued by broker fan-out",
            fanout_frames.clone(),
        );
        registry.register(
            "sealnote_socket_connections",
            "Currently open broker sockets",
            socket_connections.clone(),
        );

        Self {
            registry,
            events_appended,
            events_rejected,
            fanout_frames,
            socket_connections,
        }
    }

    pub fn appended(&self, kind: &str) {
        self.events_appended
            .get_or_create(&vec![("kind".to_string(), kind.to_string())])
            .inc();
    }

    pub fn rejected(&self, reason: &str) {
        self.events_rejected
            .get_or_create(&vec![("reason".to_string(), reason.to_string())])
            .inc();
    }

    pub fn fanned_out(&self, frames: usize) {
        self.fanout_frames.inc_by(frames as u64);
    }

    pub fn socket_opened(&self) {
        self.socket_connections.inc();
    }

    pub fn socket_closed(&self) {
        self.socket_connections.dec();
    }

    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct HealthState {
    pub metrics: Arc<Metrics>,
    pub log: Arc<dyn NotesLog>,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

/// Serve metrics and probes on `addr` (e.g. "127.0.0.1:9100").
pub async fn serve(addr: String, state: HealthState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz, /readyz");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match state.log.check_health().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unreachable")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_appear_in_exposition() {
        let metrics = Metrics::new();
        metrics.appended("create");
        metrics.appended("create");
        metrics.rejected("missing_target");
        metrics.fanned_out(3);
        metrics.socket_opened();

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"sealnote_events_appended_total{kind="create"} 2"#));
        assert!(text.contains(r#"sealnote_events_rejected_total{reason="missing_target"} 1"#));
        assert!(text.contains("sealnote_fanout_frames_total 3"));
        assert!(text.contains("sealnote_socket_connections 1"));
    }
}
