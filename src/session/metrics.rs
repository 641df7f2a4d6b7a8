// ABOUTME: Metrics sink injected into sessions, with a default backed by the `metrics` facade
// ABOUTME: Tracks bound gateway sessions and how long each session lived

use metrics::{gauge, histogram};
use std::time::Duration;

/// Receives session lifecycle measurements.
pub trait MetricsSink: Send + Sync {
    /// A gateway session finished binding.
    fn session_opened(&self, gateway: &str);

    /// A bound gateway session went away (unbind, connection loss or stop).
    fn session_closed(&self, gateway: &str);

    fn observe_session_duration(&self, gateway: &str, duration: Duration);
}

/// Reports through whatever recorder is installed for the `metrics` crate,
/// e.g. a Prometheus exporter. Without a recorder every call is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderMetrics;

impl MetricsSink for RecorderMetrics {
    fn session_opened(&self, gateway: &str) {
        gauge!("smpp_active_sessions", "gateway" => gateway.to_string()).increment(1.0);
    }

    fn session_closed(&self, gateway: &str) {
        gauge!("smpp_active_sessions", "gateway" => gateway.to_string()).decrement(1.0);
    }

    fn observe_session_duration(&self, gateway: &str, duration: Duration) {
        histogram!("smpp_session_duration_seconds", "gateway" => gateway.to_string())
            .record(duration.as_secs_f64());
    }
}
