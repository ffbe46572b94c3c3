//! Metrics registry for fleet observability
//!
//! Provides OpenTelemetry metrics for:
//! - Remote cluster topology (clusters registered at bootstrap)
//! - Drift detection (restart triggers by reason)
//! - Reconcile health (errors and duration)

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for fleet metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("fleet"));

/// Gauge of remote clusters registered by the last bootstrap
pub static REMOTE_CLUSTERS: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("fleet_remote_clusters")
        .with_description("Number of remote clusters registered at bootstrap")
        .with_unit("{clusters}")
        .build()
});

/// Counter of detected drift events
///
/// Labels:
/// - `reason`: config_deleted, markers_missing, secret_missing, fingerprint_mismatch
pub static DRIFT_EVENTS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("fleet_drift_events_total")
        .with_description("Total number of ClientConfig drift events")
        .with_unit("{events}")
        .build()
});

/// Counter of failed reconciles
///
/// Labels:
/// - `retryable`: true, false
pub static RECONCILE_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("fleet_reconcile_errors_total")
        .with_description("Total number of ClientConfig reconcile errors")
        .with_unit("{errors}")
        .build()
});

/// Histogram of reconcile duration
///
/// Labels:
/// - `result`: stable, drift, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("fleet_reconcile_duration_seconds")
        .with_description("Duration of ClientConfig reconciles in seconds")
        .with_unit("s")
        .build()
});

/// Outcome label for a finished reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileResult {
    /// Nothing changed
    Stable,
    /// Drift detected, restart requested
    Drift,
    /// Reconcile returned an error
    Error,
}

impl ReconcileResult {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Drift => "drift",
            Self::Error => "error",
        }
    }
}

/// Times one reconcile
pub struct ReconcileTimer {
    start: std::time::Instant,
}

impl ReconcileTimer {
    /// Start timing a reconcile
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Record completion with the given outcome
    pub fn finish(self, result: ReconcileResult) {
        RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("result", result.as_str())],
        );
    }
}

/// Update the remote cluster gauge
pub fn set_remote_clusters(count: usize) {
    REMOTE_CLUSTERS.record(i64::try_from(count).unwrap_or(i64::MAX), &[]);
}

/// Count a drift event
pub fn record_drift(reason: &'static str) {
    DRIFT_EVENTS.add(1, &[KeyValue::new("reason", reason)]);
}

/// Count a reconcile error
pub fn record_reconcile_error(retryable: bool) {
    RECONCILE_ERRORS.add(1, &[KeyValue::new("retryable", retryable.to_string())]);
}
