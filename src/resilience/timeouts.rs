//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap every upstream call with its own deadline
//! - Cancel the call cleanly on expiry
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; dropping the call future releases its
//!   connection and timers
//! - Timeout errors are distinct from other errors

use std::time::{Duration, Instant};

use crate::observability::metrics;
use crate::upstream::{CallError, Payload, Upstream};

/// Call `upstream`, giving up after `timeout`.
pub async fn call_with_timeout<U>(upstream: &U, timeout: Duration) -> Result<Payload, CallError>
where
    U: Upstream + ?Sized,
{
    let started = Instant::now();
    let result = match tokio::time::timeout(timeout, upstream.call(timeout)).await {
        Ok(result) => result,
        Err(_) => Err(CallError::Timeout(timeout)),
    };

    let label = match &result {
        Ok(_) => "success",
        Err(CallError::Timeout(_)) => "timeout",
        Err(_) => "failure",
    };
    metrics::record_upstream_call(upstream.name(), label, started);

    if let Err(e) = &result {
        tracing::warn!(upstream = %upstream.name(), error = %e, "Upstream call failed");
    }
    result
}
