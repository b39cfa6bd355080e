//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the playout server:
//! - HTTP request metrics (latency, counts)
//! - Playout loop status (collected dynamically)
//! - Core collectors registered from `playout_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::warn;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "playout_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("playout_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

// =============================================================================
// Playout Status Metrics
// =============================================================================

/// Whether a transmission is on air (0 or 1).
pub static ON_AIR: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("playout_on_air", "Whether a transmission is currently running").unwrap()
});

/// Items played in the current rotation.
pub static PLAYED_IN_ROTATION: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "playout_played_in_rotation",
        "Items already played in the current rotation",
    )
    .unwrap()
});

/// Current consecutive catalog failures.
pub static CONSECUTIVE_CATALOG_FAILURES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "playout_consecutive_catalog_failures",
        "Consecutive catalog load failures",
    )
    .unwrap()
});

/// Current consecutive spawn failures.
pub static CONSECUTIVE_SPAWN_FAILURES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "playout_consecutive_spawn_failures",
        "Consecutive transmitter spawn failures",
    )
    .unwrap()
});

/// Register all metrics with the registry.
fn register_metrics(registry: &Registry) {
    // HTTP metrics
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();

    // Playout status
    registry.register(Box::new(ON_AIR.clone())).unwrap();
    registry
        .register(Box::new(PLAYED_IN_ROTATION.clone()))
        .unwrap();
    registry
        .register(Box::new(CONSECUTIVE_CATALOG_FAILURES.clone()))
        .unwrap();
    registry
        .register(Box::new(CONSECUTIVE_SPAWN_FAILURES.clone()))
        .unwrap();

    // Core metrics (catalog, transmissions, persistence)
    for metric in playout_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the live controller status.
pub async fn collect_dynamic_metrics(state: &AppState) {
    let status = state.status().await;
    ON_AIR.set(i64::from(state.supervisor_state().is_active()));
    PLAYED_IN_ROTATION.set(status.played_in_rotation as i64);
    CONSECUTIVE_CATALOG_FAILURES.set(i64::from(status.consecutive_catalog_failures));
    CONSECUTIVE_SPAWN_FAILURES.set(i64::from(status.consecutive_spawn_failures));
}
