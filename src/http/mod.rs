//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → request.rs (assign / propagate x-request-id)
//!     → server.rs (route: /consulta, /dispatch, /breaker, /health)
//!     → dispatch::Dispatcher
//!     → response.rs (JSON body, 502/504 mapping for dispatch errors)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
