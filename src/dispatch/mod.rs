//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound call
//!     → Breaker::admit_primary
//!         granted → primary (normal timeout) → report outcome
//!             failure: strict → error | graceful → secondary "(fallback)"
//!         denied while open → eager probe (short timeout)
//!             success → force_close, serve primary payload
//!     → secondary (own timeout)
//!     → both failed → DispatchError::BothUnavailable
//! ```
//!
//! # Design Decisions
//! - No request waits on another request's primary call
//! - Primary failures are absorbed into breaker bookkeeping, never surfaced
//!   raw unless strict mode asks for it or both upstreams fail
//! - Eager probes bypass the half-open budget

pub mod dispatcher;
pub mod error;

pub use dispatcher::{Dispatched, Dispatcher, Source};
pub use error::DispatchError;
