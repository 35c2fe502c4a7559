//! Error taxonomy for the orchestration layer.
//!
//! [`UpstreamError`] is what network calls produce. [`EligibilityError`] is
//! what callers of the orchestrator see; every variant maps to an
//! [`ErrorKind`] and an [`ErrorCategory`] so a caller can tell "fix your
//! input" from "try again later" from "our fault".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use eligibility_core::ValidationError;

use crate::resilience::{Classify, FailureTag, FromTimeout};

/// Transport-level failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportCode {
    ConnectionReset,
    ConnectionRefused,
    ConnectionAborted,
    TimedOut,
    DnsFailure,
    Other,
}

impl fmt::Display for TransportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportCode::ConnectionReset => "connection_reset",
            TransportCode::ConnectionRefused => "connection_refused",
            TransportCode::ConnectionAborted => "connection_aborted",
            TransportCode::TimedOut => "timed_out",
            TransportCode::DnsFailure => "dns_failure",
            TransportCode::Other => "other",
        };
        f.write_str(s)
    }
}

/// Failure of a single call to the upstream provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("transport error ({code}): {message}")]
    Transport { code: TransportCode, message: String },

    #[error("upstream returned {status}: {message}")]
    Status {
        status: u16,
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("could not decode upstream response: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// HTTP status, when the provider answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 401 or 403.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

impl Classify for UpstreamError {
    fn failure_tag(&self) -> FailureTag {
        match self {
            UpstreamError::Transport { code, .. } => FailureTag::Transport(*code),
            UpstreamError::Status {
                status,
                retry_after,
                ..
            } => FailureTag::Status {
                status: *status,
                retry_after: *retry_after,
            },
            UpstreamError::Decode(_) => FailureTag::Other,
        }
    }
}

impl FromTimeout for UpstreamError {
    fn from_timeout(after: Duration) -> Self {
        UpstreamError::Transport {
            code: TransportCode::TimedOut,
            message: format!("attempt timed out after {:?}", after),
        }
    }
}

/// Failure kind surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    AuthFailed,
    AuthUnavailable,
    CircuitOpen,
    RetriesExhausted,
    UpstreamRejected,
    Timeout,
    Internal,
}

/// Who should act on a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Fix your input
    Client,

    /// Try again later
    Transient,

    /// Our fault
    Internal,
}

/// Errors from an eligibility check.
#[derive(Error, Debug)]
pub enum EligibilityError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("authentication with the eligibility provider failed: {0}")]
    AuthFailed(String),

    #[error("authentication unavailable: {0}")]
    AuthUnavailable(String),

    #[error("circuit '{0}' is open, failing fast")]
    CircuitOpen(String),

    #[error("eligibility call failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: UpstreamError },

    #[error("eligibility provider rejected the request ({status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("eligibility call timed out after {0:?}")]
    Timeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EligibilityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EligibilityError::Validation(_) => ErrorKind::Validation,
            EligibilityError::AuthFailed(_) => ErrorKind::AuthFailed,
            EligibilityError::AuthUnavailable(_) => ErrorKind::AuthUnavailable,
            EligibilityError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            EligibilityError::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            EligibilityError::UpstreamRejected { .. } => ErrorKind::UpstreamRejected,
            EligibilityError::Timeout(_) => ErrorKind::Timeout,
            EligibilityError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::UpstreamRejected => ErrorCategory::Client,
            ErrorKind::AuthUnavailable
            | ErrorKind::CircuitOpen
            | ErrorKind::RetriesExhausted
            | ErrorKind::Timeout => ErrorCategory::Transient,
            ErrorKind::AuthFailed | ErrorKind::Internal => ErrorCategory::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_tags() {
        let throttled = UpstreamError::Status {
            status: 429,
            retry_after: Some(Duration::from_secs(2)),
            message: "slow down".to_string(),
        };
        assert_eq!(
            throttled.failure_tag(),
            FailureTag::Status {
                status: 429,
                retry_after: Some(Duration::from_secs(2))
            }
        );
        assert_eq!(
            UpstreamError::Decode("eof".to_string()).failure_tag(),
            FailureTag::Other
        );
        assert!(UpstreamError::Status {
            status: 403,
            retry_after: None,
            message: String::new()
        }
        .is_auth_rejection());
        assert_eq!(
            UpstreamError::from_timeout(Duration::from_secs(10)).failure_tag(),
            FailureTag::Transport(TransportCode::TimedOut)
        );
    }

    #[test]
    fn test_categories() {
        let validation =
            EligibilityError::from(ValidationError::single("subscriber.memberId", "required"));
        assert_eq!(validation.kind(), ErrorKind::Validation);
        assert_eq!(validation.category(), ErrorCategory::Client);

        assert_eq!(
            EligibilityError::CircuitOpen("eligibility".to_string()).category(),
            ErrorCategory::Transient
        );
        assert_eq!(
            EligibilityError::AuthFailed("bad client".to_string()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::RetriesExhausted).unwrap(),
            "\"retries_exhausted\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCategory::Transient).unwrap(),
            "\"transient\""
        );
    }
}
