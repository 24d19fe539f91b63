//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the primary:
//!     → circuit_breaker.rs (admit or deny)
//!     → timeouts.rs (enforce the call's deadline)
//!     → circuit_breaker.rs (report the outcome)
//!     → policy.rs (decide whether a closed breaker trips)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - One breaker state machine, interchangeable failure policies
//! - Breaker bookkeeping is locked, upstream calls are not

pub mod circuit_breaker;
pub mod policy;
pub mod timeouts;

pub use circuit_breaker::{Admission, Breaker, BreakerSnapshot, BreakerState, Denial, Outcome, Permit};
pub use policy::{ConsecutiveFailures, FailurePolicy, SlidingWindow};
pub use timeouts::call_with_timeout;
