//! Response shaping.
//!
//! # Responsibilities
//! - Serialize dispatch results with the breaker snapshot attached
//! - Map dispatch errors to HTTP status codes
//!
//! # Design Decisions
//! - Primary timeouts surfaced in strict mode become 504 Gateway Timeout
//! - Every other dispatch failure is 502 Bad Gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::dispatch::{DispatchError, Dispatched, Source};
use crate::resilience::circuit_breaker::BreakerSnapshot;

#[derive(Debug, Serialize)]
pub struct DispatchBody {
    pub source: Source,
    pub upstream: String,
    pub result: String,
    pub breaker: BreakerSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    pub breaker: BreakerSnapshot,
}

pub fn status_for(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::PrimaryTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

pub fn dispatched_response(served: Dispatched, breaker: BreakerSnapshot) -> Response {
    Json(DispatchBody {
        source: served.source,
        upstream: served.upstream,
        result: served.payload.body,
        breaker,
    })
    .into_response()
}

pub fn dispatch_error_response(err: &DispatchError, breaker: BreakerSnapshot) -> Response {
    let body = ErrorBody {
        error: err.to_string(),
        kind: err.kind(),
        breaker,
    };
    (status_for(err), Json(body)).into_response()
}
