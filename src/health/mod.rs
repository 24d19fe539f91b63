//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Recovery prober (recovery.rs):
//!     Periodic timer
//!     → breaker open? probe the primary
//!     → success: Breaker::force_close
//! ```
//!
//! # Design Decisions
//! - Passive detection lives in the breaker; this subsystem only shortens recovery
//! - One probe in flight at a time
//! - Never touches half-open probes admitted by live traffic

pub mod recovery;

pub use recovery::{ProbeResult, RecoveryProber};
