//! Upstream services subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher / recovery prober
//!     → resilience::timeouts (bound the call)
//!     → Upstream::call (http.rs binds it to a GET against a URL)
//!     → Result<Payload, CallError>
//! ```
//!
//! # Design Decisions
//! - The dispatcher only sees success / failure / timeout, never HTTP details
//! - Non-2xx responses are failures, same as connection errors
//! - The timeout is passed down so bindings can size their own deadlines

pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

pub use self::http::HttpUpstream;

/// Body returned by a successful upstream call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payload {
    pub body: String,
}

impl Payload {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// Why a single upstream call did not produce a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("upstream returned status {status}")]
    Status { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),
}

/// A remote service the dispatcher can call.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Name used in logs, metrics and responses.
    fn name(&self) -> &str;

    /// Perform one call. Callers enforce `timeout` themselves; implementations
    /// may use it to size connection-level deadlines.
    async fn call(&self, timeout: Duration) -> Result<Payload, CallError>;
}
