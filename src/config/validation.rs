//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, rates in (0, 1])
//! - Check upstream URLs parse
//! - Check the inbound request timeout outlasts the slowest dispatch path
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatcherConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use url::Url;

use crate::config::schema::{DispatcherConfig, PolicyConfig, UpstreamConfig};

/// Eager probes must resolve well inside a normal request.
const MAX_EAGER_PROBE_MS: u64 = 1000;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &DispatcherConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "must be a socket address"));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }

    check_upstream("primary", &config.primary, &mut errors);
    check_upstream("secondary", &config.secondary, &mut errors);

    let request_timeout_ms = config.listener.request_timeout_secs.saturating_mul(1000);
    let worst_dispatch_ms = config
        .primary
        .timeout_ms
        .max(config.eager_probe.timeout_ms)
        .saturating_add(config.secondary.timeout_ms);
    if request_timeout_ms > 0 && request_timeout_ms <= worst_dispatch_ms {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            format!("must exceed the slowest dispatch path ({worst_dispatch_ms}ms)"),
        ));
    }

    match config.breaker.policy {
        PolicyConfig::Consecutive { threshold } => {
            if threshold == 0 {
                errors.push(ValidationError::new("breaker.policy.threshold", "must be at least 1"));
            }
        }
        PolicyConfig::SlidingWindow { window, failure_rate } => {
            if window == 0 {
                errors.push(ValidationError::new("breaker.policy.window", "must be at least 1"));
            }
            if !(failure_rate > 0.0 && failure_rate <= 1.0) {
                errors.push(ValidationError::new("breaker.policy.failure_rate", "must be in (0, 1]"));
            }
        }
    }
    if config.breaker.open_cooldown_ms == 0 {
        errors.push(ValidationError::new("breaker.open_cooldown_ms", "must be greater than 0"));
    }
    if config.breaker.half_open_probe_count == 0 {
        errors.push(ValidationError::new("breaker.half_open_probe_count", "must be at least 1"));
    }

    if config.eager_probe.timeout_ms == 0 || config.eager_probe.timeout_ms >= MAX_EAGER_PROBE_MS {
        errors.push(ValidationError::new(
            "eager_probe.timeout_ms",
            format!("must be between 1 and {}", MAX_EAGER_PROBE_MS - 1),
        ));
    }

    if config.recovery.interval_ms == 0 {
        errors.push(ValidationError::new("recovery.interval_ms", "must be greater than 0"));
    }
    if config.recovery.timeout_ms == 0 {
        errors.push(ValidationError::new("recovery.timeout_ms", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "must be a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_upstream(section: &str, upstream: &UpstreamConfig, errors: &mut Vec<ValidationError>) {
    match Url::parse(&upstream.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            format!("{section}.url"),
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(format!("{section}.url"), e.to_string())),
    }
    if upstream.timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{section}.timeout_ms"), "must be greater than 0"));
    }
}
