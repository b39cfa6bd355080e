//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Catalog loading
//! - Transmissions (starts, outcomes, spawn failures)
//! - Play history persistence and guide publishing

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Catalog Metrics
// =============================================================================

/// Catalog loads by result.
pub static CATALOG_LOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("playout_catalog_loads_total", "Total catalog load attempts"),
        &["result"], // "ok", "empty", "malformed"
    )
    .unwrap()
});

/// Items in the most recently loaded catalog.
pub static CATALOG_ITEMS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "playout_catalog_items",
        "Number of items in the current catalog",
    )
    .unwrap()
});

// =============================================================================
// Transmission Metrics
// =============================================================================

/// Transmissions started by kind.
pub static TRANSMISSIONS_STARTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "playout_transmissions_started_total",
            "Total transmissions started",
        ),
        &["kind"], // "item", "interstitial"
    )
    .unwrap()
});

/// Finished transmissions by result.
pub static TRANSMISSIONS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "playout_transmissions_finished_total",
            "Total transmissions finished",
        ),
        &["result"], // "succeeded", "failed", "cancelled"
    )
    .unwrap()
});

/// Transmission duration in seconds.
pub static TRANSMISSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "playout_transmission_duration_seconds",
            "Wall-clock duration of transmissions",
        )
        .buckets(vec![
            1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 5400.0, 7200.0, 10800.0,
        ]),
        &["result"],
    )
    .unwrap()
});

/// Transmitter launches that never started.
pub static SPAWN_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "playout_spawn_failures_total",
            "Total transmitter spawn failures",
        ),
        &["kind"],
    )
    .unwrap()
});

/// Completed rotations.
pub static ROTATIONS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "playout_rotations_completed_total",
        "Total rotations completed (history resets)",
    )
    .unwrap()
});

// =============================================================================
// Persistence Metrics
// =============================================================================

/// Failed history writes.
pub static HISTORY_WRITE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "playout_history_write_failures_total",
            "Total play history write failures",
        ),
        &["kind"], // "structural", "transient"
    )
    .unwrap()
});

/// Failed guide publications.
pub static GUIDE_PUBLISH_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "playout_guide_publish_failures_total",
        "Total programme guide publish failures",
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Catalog
        Box::new(CATALOG_LOADS.clone()),
        Box::new(CATALOG_ITEMS.clone()),
        // Transmissions
        Box::new(TRANSMISSIONS_STARTED.clone()),
        Box::new(TRANSMISSIONS_FINISHED.clone()),
        Box::new(TRANSMISSION_DURATION.clone()),
        Box::new(SPAWN_FAILURES.clone()),
        Box::new(ROTATIONS_COMPLETED.clone()),
        // Persistence
        Box::new(HISTORY_WRITE_FAILURES.clone()),
        Box::new(GUIDE_PUBLISH_FAILURES.clone()),
    ]
}
