//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const SESSIONS_TOTAL: &str = "huddle_sessions_total";
    pub const SESSIONS_ACTIVE: &str = "huddle_sessions_active";
    pub const SESSIONS_REJECTED: &str = "huddle_sessions_rejected_total";
    pub const SESSIONS_KICKED: &str = "huddle_sessions_kicked_total";
    pub const FRAMES_INBOUND: &str = "huddle_frames_inbound_total";
    pub const EVENTS_OUTBOUND: &str = "huddle_events_outbound_total";
    pub const OUTBOUND_BYTES: &str = "huddle_outbound_bytes_total";
    pub const ROOMS_ACTIVE: &str = "huddle_rooms_active";
    pub const LATENCY_SECONDS: &str = "huddle_event_latency_seconds";
    pub const ERRORS_TOTAL: &str = "huddle_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::SESSIONS_TOTAL,
        "Total number of sessions since server start"
    );
    metrics::describe_gauge!(names::SESSIONS_ACTIVE, "Current number of live sessions");
    metrics::describe_counter!(
        names::SESSIONS_REJECTED,
        "Sessions refused during authentication or join, by reason"
    );
    metrics::describe_counter!(
        names::SESSIONS_KICKED,
        "Sessions terminated because delivery to them failed"
    );
    metrics::describe_counter!(names::FRAMES_INBOUND, "Inbound frames, by encoding");
    metrics::describe_counter!(names::EVENTS_OUTBOUND, "Outbound events, by type");
    metrics::describe_counter!(names::OUTBOUND_BYTES, "Total bytes of outbound events");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Rooms with at least one live session");
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Inbound event handling latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Errors reported to sessions, by kind");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new session.
pub fn record_session() {
    counter!(names::SESSIONS_TOTAL).increment(1);
    gauge!(names::SESSIONS_ACTIVE).increment(1.0);
}

/// Record a session ending.
pub fn record_session_end() {
    gauge!(names::SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a session refused at authentication or join.
pub fn record_rejected(reason: &'static str) {
    counter!(names::SESSIONS_REJECTED, "reason" => reason).increment(1);
}

/// Record a session kicked for failed delivery.
pub fn record_kicked() {
    counter!(names::SESSIONS_KICKED).increment(1);
}

/// Record an inbound frame.
pub fn record_inbound(encoding: &'static str) {
    counter!(names::FRAMES_INBOUND, "encoding" => encoding).increment(1);
}

/// Record an outbound event.
pub fn record_outbound(kind: &'static str, bytes: usize) {
    counter!(names::EVENTS_OUTBOUND, "type" => kind).increment(1);
    counter!(names::OUTBOUND_BYTES).increment(bytes as u64);
}

/// Record event handling latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Update active room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Record an error.
pub fn record_error(kind: &'static str) {
    counter!(names::ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Metrics guard that records the session ending on drop.
pub struct SessionMetricsGuard;

impl SessionMetricsGuard {
    /// Create a new metrics guard, recording a session.
    #[must_use]
    pub fn new() -> Self {
        record_session();
        Self
    }
}

impl Default for SessionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionMetricsGuard {
    fn drop(&mut self) {
        record_session_end();
    }
}
