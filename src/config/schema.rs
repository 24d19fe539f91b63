//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dispatcher.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the failover dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Preferred upstream.
    pub primary: UpstreamConfig,

    /// Fallback upstream.
    pub secondary: UpstreamConfig,

    /// Circuit breaker guarding the primary.
    pub breaker: BreakerConfig,

    /// Per-request routing behaviour.
    pub dispatch: DispatchConfig,

    /// Short-timeout probe on denied requests.
    pub eager_probe: EagerProbeConfig,

    /// Background recovery prober.
    pub recovery: RecoveryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            primary: UpstreamConfig::new("primary", "http://127.0.0.1:3001/score"),
            secondary: UpstreamConfig::new("secondary", "http://127.0.0.1:3002/score"),
            breaker: BreakerConfig::default(),
            dispatch: DispatchConfig::default(),
            eager_probe: EagerProbeConfig::default(),
            recovery: RecoveryConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    pub bind_address: String,

    /// Whole-request timeout for inbound calls in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4000".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// One upstream service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Name reported in responses, logs and metrics.
    pub name: String,

    /// URL fetched with `GET`.
    pub url: String,

    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
}

impl UpstreamConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            name: "upstream".to_string(),
            url: String::new(),
            timeout_ms: 2000,
        }
    }
}

/// Circuit breaker configuration. Immutable for the breaker's lifetime.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failure classification policy.
    pub policy: PolicyConfig,

    /// Time spent open before admitting a probe, in milliseconds.
    pub open_cooldown_ms: u64,

    /// Probes admitted per half-open cycle.
    pub half_open_probe_count: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::default(),
            open_cooldown_ms: 30_000,
            half_open_probe_count: 1,
        }
    }
}

/// When a closed breaker opens.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    /// Open after `threshold` failures in a row.
    Consecutive { threshold: u32 },

    /// Open when at least `failure_rate` of the last `window` outcomes failed.
    SlidingWindow { window: u32, failure_rate: f64 },
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig::SlidingWindow {
            window: 10,
            failure_rate: 0.5,
        }
    }
}

/// What happens when an admitted primary call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Retry the same request against the secondary.
    #[default]
    Graceful,
    /// Surface the primary failure immediately.
    Strict,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DispatchConfig {
    pub fallback_mode: FallbackMode,
}

/// Eager probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EagerProbeConfig {
    /// Try the primary directly when admission is denied.
    pub enabled: bool,

    /// Probe timeout in milliseconds. Must stay under one second.
    pub timeout_ms: u64,

    /// Also probe on half-open denials; success then closes the breaker and
    /// invalidates outstanding formal probes.
    pub supersede_half_open: bool,
}

impl EagerProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EagerProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 500,
            supersede_half_open: false,
        }
    }
}

/// Background recovery prober configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub enabled: bool,

    /// Tick interval in milliseconds.
    pub interval_ms: u64,

    /// Probe timeout in milliseconds.
    pub timeout_ms: u64,
}

impl RecoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5000,
            timeout_ms: 1000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
