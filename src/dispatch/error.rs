//! Dispatch errors.

use std::time::Duration;

use crate::upstream::CallError;

/// Why a dispatch, or one leg of it, failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("primary unavailable: breaker denied admission")]
    PrimaryUnavailable,

    #[error("primary call failed: {0}")]
    PrimaryCallFailed(String),

    #[error("primary timed out after {}ms", .0.as_millis())]
    PrimaryTimeout(Duration),

    #[error("secondary call failed: {0}")]
    SecondaryCallFailed(String),

    #[error("secondary timed out after {}ms", .0.as_millis())]
    SecondaryTimeout(Duration),

    /// Terminal for a request: neither upstream produced a payload.
    #[error("both upstreams unavailable ({primary}; {secondary})")]
    BothUnavailable {
        primary: Box<DispatchError>,
        secondary: Box<DispatchError>,
    },
}

impl DispatchError {
    pub fn from_primary(err: CallError) -> Self {
        match err {
            CallError::Timeout(after) => DispatchError::PrimaryTimeout(after),
            other => DispatchError::PrimaryCallFailed(other.to_string()),
        }
    }

    pub fn from_secondary(err: CallError) -> Self {
        match err {
            CallError::Timeout(after) => DispatchError::SecondaryTimeout(after),
            other => DispatchError::SecondaryCallFailed(other.to_string()),
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::PrimaryUnavailable => "primary_unavailable",
            DispatchError::PrimaryCallFailed(_) => "primary_call_failed",
            DispatchError::PrimaryTimeout(_) => "primary_timeout",
            DispatchError::SecondaryCallFailed(_) => "secondary_call_failed",
            DispatchError::SecondaryTimeout(_) => "secondary_timeout",
            DispatchError::BothUnavailable { .. } => "both_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_names_both_reasons() {
        let err = DispatchError::BothUnavailable {
            primary: Box::new(DispatchError::from_primary(CallError::Status { status: 500 })),
            secondary: Box::new(DispatchError::from_secondary(CallError::Timeout(Duration::from_millis(250)))),
        };
        let message = err.to_string();
        assert!(message.contains("primary call failed: upstream returned status 500"), "{message}");
        assert!(message.contains("secondary timed out after 250ms"), "{message}");
    }
}
