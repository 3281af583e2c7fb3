//! Prometheus metrics for aero.
//!
//! Covers the relay path (received, persisted, rejected, broadcast) and
//! viewer connections.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Readings handled by the relay.
/// Labels: outcome (broadcast/persist_failed/rejected)
pub static READINGS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "aero_readings_total",
        "Sensor readings handled by the relay",
        &["outcome"]
    )
    .unwrap()
});

/// Store save latency in milliseconds.
pub static PERSIST_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "aero_persist_latency_ms",
        "Reading store save latency in milliseconds",
        &["store"],
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 500.0]
    )
    .unwrap()
});

/// Viewers that received the most recent broadcast.
pub static BROADCAST_RECEIVERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "aero_broadcast_receivers",
        "Viewers subscribed at the most recent broadcast"
    )
    .unwrap()
});

/// Open WebSocket connections.
pub static WS_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("aero_ws_connections", "Open WebSocket connections").unwrap()
});

/// Broadcast events skipped by slow viewers.
pub static VIEWER_LAGGED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "aero_viewer_lagged_total",
        "Broadcast events skipped by lagging viewers"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Reading persisted and broadcast.
    pub fn reading_broadcast(receivers: usize) {
        READINGS_TOTAL.with_label_values(&["broadcast"]).inc();
        BROADCAST_RECEIVERS.set(receivers as i64);
    }

    /// Reading dropped because the store save failed.
    pub fn reading_persist_failed() {
        READINGS_TOTAL.with_label_values(&["persist_failed"]).inc();
    }

    /// Inbound frame could not be parsed into a reading.
    pub fn reading_rejected() {
        READINGS_TOTAL.with_label_values(&["rejected"]).inc();
    }

    /// Record a store save duration.
    pub fn persist_latency(store: &str, latency_ms: f64) {
        PERSIST_LATENCY_MS
            .with_label_values(&[store])
            .observe(latency_ms);
    }

    pub fn ws_connected() {
        WS_CONNECTIONS.inc();
    }

    pub fn ws_disconnected() {
        WS_CONNECTIONS.dec();
    }

    /// A viewer fell behind and skipped `skipped` events.
    pub fn viewer_lagged(skipped: u64) {
        VIEWER_LAGGED_TOTAL.inc_by(skipped);
    }

    /// Render the default registry in the Prometheus text format.
    pub fn encode() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
