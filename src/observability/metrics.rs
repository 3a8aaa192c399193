//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `shield_rate_limit_wait_seconds` (histogram): time spent in `acquire`
//! - `shield_operations_total` (counter): primary call outcomes
//! - `shield_fallbacks_total` (counter): fallback outcomes
//! - `shield_recovery_attempts_total` (counter): recovery outcomes
//! - `shield_event_handler_failures_total` (counter): handler errors/timeouts
//!
//! All recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_breaker_state(service: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("shield_breaker_state", "service" => service.to_string()).set(value);
}

pub fn record_rate_limit_wait(service: &str, waited: Duration) {
    histogram!("shield_rate_limit_wait_seconds", "service" => service.to_string())
        .record(waited.as_secs_f64());
}

pub fn record_operation(service: &str, outcome: &'static str) {
    counter!("shield_operations_total", "service" => service.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_fallback(service: &str, outcome: &'static str) {
    counter!("shield_fallbacks_total", "service" => service.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_recovery_attempt(service: &str, outcome: &'static str) {
    counter!(
        "shield_recovery_attempts_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_handler_failure(event_type: &str, reason: &'static str) {
    counter!(
        "shield_event_handler_failures_total",
        "event" => event_type.to_string(),
        "reason" => reason
    )
    .increment(1);
}
