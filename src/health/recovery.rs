//! Background recovery probing.
//!
//! # Responsibilities
//! - Periodically probe the primary while the breaker is open
//! - Close the breaker early when a probe succeeds

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::RecoveryConfig;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{Breaker, BreakerState};
use crate::resilience::timeouts::call_with_timeout;
use crate::upstream::Upstream;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// Breaker was not open.
    Skipped,
    /// Probe succeeded and closed the breaker.
    Closed,
    /// Probe succeeded but the breaker had already moved on.
    Superseded,
    /// Probe failed or timed out.
    Failed,
}

pub struct RecoveryProber {
    breaker: Arc<Breaker>,
    primary: Arc<dyn Upstream>,
    interval: Duration,
    timeout: Duration,
}

impl RecoveryProber {
    pub fn new(breaker: Arc<Breaker>, primary: Arc<dyn Upstream>, config: &RecoveryConfig) -> Self {
        Self {
            breaker,
            primary,
            interval: config.interval(),
            timeout: config.timeout(),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            timeout_ms = self.timeout.as_millis() as u64,
            upstream = %self.primary.name(),
            "Recovery prober starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Recovery prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one tick. Probes only while the breaker is open.
    pub async fn probe_once(&self) -> ProbeResult {
        let snapshot = self.breaker.snapshot();
        if snapshot.state != BreakerState::Open {
            return ProbeResult::Skipped;
        }

        match call_with_timeout(&*self.primary, self.timeout).await {
            Ok(_) => {
                metrics::record_probe("background", true);
                if self.breaker.force_close(snapshot.generation) {
                    tracing::info!(upstream = %self.primary.name(), "Background probe succeeded, breaker closed");
                    ProbeResult::Closed
                } else {
                    ProbeResult::Superseded
                }
            }
            Err(e) => {
                metrics::record_probe("background", false);
                tracing::debug!(upstream = %self.primary.name(), error = %e, "Background probe failed");
                ProbeResult::Failed
            }
        }
    }
}
