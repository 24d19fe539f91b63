//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the breaker, upstream bindings, dispatcher and prober from config
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - One HTTP client shared by both upstreams and the probes

use std::sync::Arc;

use crate::config::DispatcherConfig;
use crate::dispatch::Dispatcher;
use crate::health::RecoveryProber;
use crate::resilience::circuit_breaker::Breaker;
use crate::upstream::{HttpUpstream, Upstream};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid upstream url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Everything the server needs, wired together.
pub struct Components {
    pub breaker: Arc<Breaker>,
    pub dispatcher: Arc<Dispatcher>,
    /// Present when recovery probing is enabled.
    pub prober: Option<RecoveryProber>,
}

/// Build the dispatcher stack from a validated configuration.
pub fn build_components(config: &DispatcherConfig) -> Result<Components, StartupError> {
    let client = reqwest::Client::builder().no_proxy().build()?;

    let primary: Arc<dyn Upstream> = Arc::new(HttpUpstream::from_config(&config.primary, client.clone())?);
    let secondary: Arc<dyn Upstream> = Arc::new(HttpUpstream::from_config(&config.secondary, client)?);

    Ok(assemble(config, primary, secondary))
}

/// Wire pre-built upstreams into a breaker, dispatcher and prober.
pub fn assemble(config: &DispatcherConfig, primary: Arc<dyn Upstream>, secondary: Arc<dyn Upstream>) -> Components {
    let breaker = Arc::new(Breaker::from_config(&config.breaker));

    tracing::info!(
        policy = ?config.breaker.policy,
        open_cooldown_ms = config.breaker.open_cooldown_ms,
        half_open_probe_count = config.breaker.half_open_probe_count,
        fallback_mode = ?config.dispatch.fallback_mode,
        "Breaker configured"
    );

    let dispatcher = Arc::new(Dispatcher::from_config(
        config,
        breaker.clone(),
        primary.clone(),
        secondary,
    ));

    let prober = config
        .recovery
        .enabled
        .then(|| RecoveryProber::new(breaker.clone(), primary, &config.recovery));

    Components {
        breaker,
        dispatcher,
        prober,
    }
}
