//! Per-request routing between the primary and secondary upstreams.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::{DispatcherConfig, EagerProbeConfig, FallbackMode};
use crate::dispatch::error::DispatchError;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{Admission, Breaker, BreakerSnapshot, BreakerState, Denial, Outcome};
use crate::resilience::timeouts::call_with_timeout;
use crate::upstream::{Payload, Upstream};

/// Where a dispatched payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Source {
    #[serde(rename = "primary")]
    Primary,
    /// Primary was not attempted, or was denied and its eager probe failed.
    #[serde(rename = "secondary")]
    Secondary,
    /// Primary was admitted, failed, and this request fell back.
    #[serde(rename = "secondary (fallback)")]
    SecondaryFallback,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Primary => "primary",
            Source::Secondary => "secondary",
            Source::SecondaryFallback => "secondary (fallback)",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successfully served request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dispatched {
    pub source: Source,
    /// Name of the upstream that produced the payload.
    pub upstream: String,
    pub payload: Payload,
}

/// Failure-aware dispatcher over one primary/secondary pair.
pub struct Dispatcher {
    breaker: Arc<Breaker>,
    primary: Arc<dyn Upstream>,
    secondary: Arc<dyn Upstream>,
    primary_timeout: Duration,
    secondary_timeout: Duration,
    fallback_mode: FallbackMode,
    eager_probe: EagerProbeConfig,
}

impl Dispatcher {
    pub fn new(breaker: Arc<Breaker>, primary: Arc<dyn Upstream>, secondary: Arc<dyn Upstream>) -> Self {
        Self {
            breaker,
            primary,
            secondary,
            primary_timeout: Duration::from_secs(2),
            secondary_timeout: Duration::from_secs(2),
            fallback_mode: FallbackMode::default(),
            eager_probe: EagerProbeConfig::default(),
        }
    }

    pub fn from_config(
        config: &DispatcherConfig,
        breaker: Arc<Breaker>,
        primary: Arc<dyn Upstream>,
        secondary: Arc<dyn Upstream>,
    ) -> Self {
        Self::new(breaker, primary, secondary)
            .with_timeouts(config.primary.timeout(), config.secondary.timeout())
            .with_fallback_mode(config.dispatch.fallback_mode)
            .with_eager_probe(config.eager_probe.clone())
    }

    pub fn with_timeouts(mut self, primary: Duration, secondary: Duration) -> Self {
        self.primary_timeout = primary;
        self.secondary_timeout = secondary;
        self
    }

    pub fn with_fallback_mode(mut self, mode: FallbackMode) -> Self {
        self.fallback_mode = mode;
        self
    }

    pub fn with_eager_probe(mut self, eager_probe: EagerProbeConfig) -> Self {
        self.eager_probe = eager_probe;
        self
    }

    pub fn breaker(&self) -> &Arc<Breaker> {
        &self.breaker
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Serve one inbound call.
    pub async fn dispatch(&self) -> Result<Dispatched, DispatchError> {
        let result = self.route().await;
        match &result {
            Ok(served) => metrics::record_request(served.source.as_str(), "ok"),
            Err(e) => {
                tracing::warn!(error = %e, "Dispatch failed");
                metrics::record_request("none", e.kind());
            }
        }
        result
    }

    async fn route(&self) -> Result<Dispatched, DispatchError> {
        let (primary_error, source) = match self.breaker.admit_primary() {
            Admission::Granted(permit) => {
                match call_with_timeout(&*self.primary, self.primary_timeout).await {
                    Ok(payload) => {
                        self.breaker.report_outcome(permit, &Outcome::Success);
                        return Ok(self.served(Source::Primary, payload));
                    }
                    Err(e) => {
                        self.breaker.report_outcome(permit, &Outcome::from(&e));
                        let error = DispatchError::from_primary(e);
                        if self.fallback_mode == FallbackMode::Strict {
                            return Err(error);
                        }
                        (error, Source::SecondaryFallback)
                    }
                }
            }
            Admission::Denied(denial) => {
                tracing::debug!(state = denial.state.as_str(), "Primary admission denied");
                match self.eager_probe(denial).await {
                    Some(Ok(payload)) => return Ok(self.served(Source::Primary, payload)),
                    Some(Err(error)) => (error, Source::Secondary),
                    None => (DispatchError::PrimaryUnavailable, Source::Secondary),
                }
            }
        };

        match call_with_timeout(&*self.secondary, self.secondary_timeout).await {
            Ok(payload) => {
                tracing::debug!(source = %source, reason = %primary_error, "Served from secondary");
                Ok(self.served(source, payload))
            }
            Err(e) => Err(DispatchError::BothUnavailable {
                primary: Box::new(primary_error),
                secondary: Box::new(DispatchError::from_secondary(e)),
            }),
        }
    }

    /// Short-timeout direct attempt at the primary after a denial.
    ///
    /// Returns `None` when no probe was made. A successful probe closes the
    /// breaker only if it has not transitioned since the denial.
    async fn eager_probe(&self, denial: Denial) -> Option<Result<Payload, DispatchError>> {
        if !self.eager_probe.enabled {
            return None;
        }
        let eligible = match denial.state {
            BreakerState::Open => true,
            BreakerState::HalfOpen => self.eager_probe.supersede_half_open,
            BreakerState::Closed => false,
        };
        if !eligible {
            return None;
        }

        let result = call_with_timeout(&*self.primary, self.eager_probe.timeout()).await;
        metrics::record_probe("eager", result.is_ok());

        Some(match result {
            Ok(payload) => {
                if self.breaker.force_close(denial.generation) {
                    tracing::info!(upstream = %self.primary.name(), "Eager probe succeeded, breaker closed");
                }
                Ok(payload)
            }
            Err(e) => Err(DispatchError::from_primary(e)),
        })
    }

    fn served(&self, source: Source, payload: Payload) -> Dispatched {
        let upstream = match source {
            Source::Primary => self.primary.name(),
            Source::Secondary | Source::SecondaryFallback => self.secondary.name(),
        };
        Dispatched {
            source,
            upstream: upstream.to_string(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::policy::ConsecutiveFailures;
    use crate::upstream::CallError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct Fake {
        name: &'static str,
        healthy: AtomicBool,
        calls: AtomicU32,
    }

    impl Fake {
        fn new(name: &'static str, healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                healthy: AtomicBool::new(healthy),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Upstream for Fake {
        fn name(&self) -> &str {
            self.name
        }

        async fn call(&self, _timeout: Duration) -> Result<Payload, CallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(Payload::new(self.name))
            } else {
                Err(CallError::Status { status: 500 })
            }
        }
    }

    fn dispatcher(primary: Arc<Fake>, secondary: Arc<Fake>, threshold: u32) -> Dispatcher {
        let breaker = Arc::new(Breaker::new(
            Box::new(ConsecutiveFailures::new(threshold)),
            Duration::from_secs(30),
            1,
        ));
        Dispatcher::new(breaker, primary, secondary).with_eager_probe(EagerProbeConfig {
            enabled: false,
            ..EagerProbeConfig::default()
        })
    }

    #[tokio::test]
    async fn test_healthy_primary_serves() {
        let d = dispatcher(Fake::new("x", true), Fake::new("y", true), 5);
        let served = d.dispatch().await.unwrap();
        assert_eq!(served.source, Source::Primary);
        assert_eq!(served.upstream, "x");
        assert_eq!(served.payload.body, "x");
    }

    #[tokio::test]
    async fn test_graceful_fallback_tags_source() {
        let secondary = Fake::new("y", true);
        let d = dispatcher(Fake::new("x", false), secondary.clone(), 5);
        let served = d.dispatch().await.unwrap();
        assert_eq!(served.source, Source::SecondaryFallback);
        assert_eq!(served.upstream, "y");
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_strict_mode_surfaces_primary_failure() {
        let secondary = Fake::new("y", true);
        let d = dispatcher(Fake::new("x", false), secondary.clone(), 5).with_fallback_mode(FallbackMode::Strict);
        let err = d.dispatch().await.unwrap_err();
        assert!(matches!(err, DispatchError::PrimaryCallFailed(_)));
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
        assert_eq!(d.snapshot().failure_count, 1);
    }

    #[tokio::test]
    async fn test_strict_mode_still_uses_secondary_when_denied() {
        let d = dispatcher(Fake::new("x", false), Fake::new("y", true), 1).with_fallback_mode(FallbackMode::Strict);
        assert!(d.dispatch().await.is_err());
        assert_eq!(d.breaker().state(), BreakerState::Open);

        let served = d.dispatch().await.unwrap();
        assert_eq!(served.source, Source::Secondary);
    }

    #[tokio::test]
    async fn test_eager_probe_failure_falls_through() {
        let primary = Fake::new("x", false);
        let d = dispatcher(primary.clone(), Fake::new("y", true), 1).with_eager_probe(EagerProbeConfig::default());
        d.dispatch().await.unwrap();
        assert_eq!(d.breaker().state(), BreakerState::Open);

        let served = d.dispatch().await.unwrap();
        assert_eq!(served.source, Source::Secondary);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
        assert_eq!(d.breaker().state(), BreakerState::Open);
    }
}
