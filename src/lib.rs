//! Failure-aware dispatcher with automatic failover.
//!
//! Calls go to a primary upstream while it is healthy and divert to a
//! secondary while a circuit breaker judges the primary unhealthy. Traffic
//! returns to the primary once a half-open probe, an eager probe or the
//! background recovery prober sees it succeed.

pub mod config;
pub mod dispatch;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod upstream;

pub use config::schema::DispatcherConfig;
pub use dispatch::{DispatchError, Dispatched, Dispatcher, Source};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::{Breaker, BreakerSnapshot, BreakerState};
