//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DispatcherConfig (validated, immutable)
//!     → handed to the breaker, dispatcher, prober and server at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; breaker settings live as long as the process
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BreakerConfig, DispatchConfig, DispatcherConfig, EagerProbeConfig, FallbackMode, ListenerConfig,
    ObservabilityConfig, PolicyConfig, RecoveryConfig, UpstreamConfig,
};
