//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatcher_requests_total` (counter): dispatches by source and result
//! - `dispatcher_upstream_duration_seconds` (histogram): upstream call latency
//! - `dispatcher_breaker_transitions_total` (counter): transitions by from/to
//! - `dispatcher_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `dispatcher_probes_total` (counter): out-of-band probes by kind and result
//!
//! # Design Decisions
//! - `metrics` facade; calls are no-ops until an exporter is installed
//! - Prometheus exporter serves its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::BreakerState;

const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics configuration error: {0}")]
    Configuration(String),

    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(LATENCY_BUCKETS)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Record one dispatched request.
pub fn record_request(source: &str, result: &str) {
    counter!(
        "dispatcher_requests_total",
        "source" => source.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record one upstream call and its latency.
pub fn record_upstream_call(upstream: &str, result: &str, started: Instant) {
    histogram!(
        "dispatcher_upstream_duration_seconds",
        "upstream" => upstream.to_string(),
        "result" => result.to_string()
    )
    .record(started.elapsed().as_secs_f64());
}

/// Record a breaker state transition.
pub fn record_breaker_transition(from: BreakerState, to: BreakerState) {
    counter!(
        "dispatcher_breaker_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    set_breaker_state(to);
}

pub fn set_breaker_state(state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    };
    gauge!("dispatcher_breaker_state").set(value);
}

/// Record an eager or background probe.
pub fn record_probe(kind: &'static str, success: bool) {
    counter!(
        "dispatcher_probes_total",
        "kind" => kind,
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
}
