//! Typed errors for the seams where callers branch on the failure kind.
//!
//! Everything else in the crate propagates [`anyhow::Result`]. The two enums
//! here exist because the retry policy needs to tell transient gateway
//! failures from permanent ones, and because the fusion engine must reject
//! malformed score vectors loudly instead of padding or truncating them.

use std::time::Duration;

/// Failure of an external collaborator (embedding model, vector store).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Timeouts, connection resets, HTTP 429 and 5xx. Safe to retry.
    #[error("transient {service} failure: {message}")]
    Transient {
        service: &'static str,
        message: String,
    },

    /// Client errors, malformed responses, contract violations. Never retried.
    #[error("{service} failure: {message}")]
    Permanent {
        service: &'static str,
        message: String,
    },

    /// A transient failure that survived every retry attempt.
    #[error("{service} failed after {attempts} attempts over {elapsed:?}: {last}")]
    Exhausted {
        service: &'static str,
        attempts: u32,
        elapsed: Duration,
        last: String,
    },
}

impl GatewayError {
    pub fn transient(service: &'static str, message: impl Into<String>) -> Self {
        Self::Transient {
            service,
            message: message.into(),
        }
    }

    pub fn permanent(service: &'static str, message: impl Into<String>) -> Self {
        Self::Permanent {
            service,
            message: message.into(),
        }
    }

    /// Whether the retry policy may re-issue the call.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Classify a `reqwest` transport error.
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            Self::transient(service, err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(service, status, err.to_string())
        } else {
            Self::permanent(service, err.to_string())
        }
    }

    /// Classify a non-success HTTP status: 429 and 5xx are transient.
    pub fn from_status(
        service: &'static str,
        status: reqwest::StatusCode,
        body: impl Into<String>,
    ) -> Self {
        let message = format!("HTTP {}: {}", status, body.into());
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Self::transient(service, message)
        } else {
            Self::permanent(service, message)
        }
    }
}

/// Contract violations detected by the hybrid fusion engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FusionError {
    #[error("{ranking} score vector has {actual} entries but the corpus has {expected}")]
    LengthMismatch {
        ranking: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("entry {index} has dimension {actual}, query has dimension {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("ranking refers to item {index} but only {len} items exist")]
    RankOutOfRange { index: usize, len: usize },
}
