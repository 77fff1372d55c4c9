//! Prometheus metrics and the HTTP endpoint serving them.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `file_integrity_phase_total` | Counter | `phase` |
//! | `file_integrity_pause_total` | Counter | `node` |
//! | `file_integrity_unpause_total` | Counter | `node` |
//! | `file_integrity_reinit_total` | Counter | `by`, `node` |
//! | `file_integrity_node_status_total` | Counter | `condition`, `node` |
//! | `file_integrity_node_failed` | Gauge | `node` |

use crate::error::ControllerError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use crds::{FileIntegrityPhase, NodeCondition};
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Value of the `by` label when a node update triggered the re-init
pub const REINIT_BY_NODE: &str = "node";

/// Counters incremented by the reconcilers
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    phase: IntCounterVec,
    pause: IntCounterVec,
    unpause: IntCounterVec,
    reinit: IntCounterVec,
    node_status: IntCounterVec,
    node_failed: IntGaugeVec,
}

impl Metrics {
    /// Create the metrics and register them with a fresh registry
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();

        let phase = IntCounterVec::new(
            Opts::new("file_integrity_phase_total", "FileIntegrity phase transitions"),
            &["phase"],
        )?;
        registry.register(Box::new(phase.clone()))?;

        let pause = IntCounterVec::new(
            Opts::new("file_integrity_pause_total", "Nodes put on hold-off for an update"),
            &["node"],
        )?;
        registry.register(Box::new(pause.clone()))?;

        let unpause = IntCounterVec::new(
            Opts::new("file_integrity_unpause_total", "Nodes released from hold-off"),
            &["node"],
        )?;
        registry.register(Box::new(unpause.clone()))?;

        let reinit = IntCounterVec::new(
            Opts::new("file_integrity_reinit_total", "AIDE database re-inits requested"),
            &["by", "node"],
        )?;
        registry.register(Box::new(reinit.clone()))?;

        let node_status = IntCounterVec::new(
            Opts::new("file_integrity_node_status_total", "Scan results recorded per node"),
            &["condition", "node"],
        )?;
        registry.register(Box::new(node_status.clone()))?;

        let node_failed = IntGaugeVec::new(
            Opts::new("file_integrity_node_failed", "Whether the last scan on a node failed"),
            &["node"],
        )?;
        registry.register(Box::new(node_failed.clone()))?;

        Ok(Self {
            registry,
            phase,
            pause,
            unpause,
            reinit,
            node_status,
            node_failed,
        })
    }

    pub fn inc_phase(&self, phase: FileIntegrityPhase) {
        self.phase.with_label_values(&[phase.as_str()]).inc();
    }

    pub fn inc_pause(&self, node: &str) {
        self.pause.with_label_values(&[node]).inc();
    }

    pub fn inc_unpause(&self, node: &str) {
        self.unpause.with_label_values(&[node]).inc();
    }

    pub fn inc_reinit(&self, by: &str, node: &str) {
        self.reinit.with_label_values(&[by, node]).inc();
    }

    /// Record a scan result and update the failed-node gauge
    pub fn observe_node_status(&self, condition: NodeCondition, node: &str) {
        self.node_status
            .with_label_values(&[condition.as_str(), node])
            .inc();
        let failed = i64::from(condition == NodeCondition::Failed);
        self.node_failed.with_label_values(&[node]).set(failed);
    }

    /// Render every metric in the Prometheus text format
    pub fn encode_text(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| ControllerError::InvalidObject(format!("metrics are not UTF-8: {e}")))
    }
}

/// `/metrics` and `/healthz`
pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Result<String, (StatusCode, String)> {
    metrics
        .encode_text()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Serve the metrics endpoint until the listener fails
pub async fn serve(addr: SocketAddr, metrics: Arc<Metrics>) -> Result<(), ControllerError> {
    info!("Starting metrics server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(metrics)).await?;
    Ok(())
}
