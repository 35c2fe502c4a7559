//! Response envelope handed back to the boundary layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use eligibility_core::EligibilityResult;

use crate::error::{EligibilityError, ErrorCategory, ErrorKind};

/// Outcome of one check, success or failure, with timing and correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub success: bool,
    pub correlation_id: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EligibilityResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Failure details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub category: ErrorCategory,
    pub message: String,

    /// Field violations, for validation failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ViolationBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationBody {
    pub field: String,
    pub message: String,
}

impl From<&EligibilityError> for ErrorBody {
    fn from(err: &EligibilityError) -> Self {
        let violations = match err {
            EligibilityError::Validation(v) => v
                .violations()
                .iter()
                .map(|v| ViolationBody {
                    field: v.field.clone(),
                    message: v.message.clone(),
                })
                .collect(),
            _ => Vec::new(),
        };

        Self {
            kind: err.kind(),
            category: err.category(),
            message: err.to_string(),
            violations,
        }
    }
}

impl ResponseEnvelope {
    pub fn from_outcome(
        outcome: Result<EligibilityResult, EligibilityError>,
        correlation_id: String,
        elapsed: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(result) => Self {
                success: true,
                correlation_id,
                duration_ms,
                timestamp: now,
                data: Some(result),
                error: None,
            },
            Err(err) => Self {
                success: false,
                correlation_id,
                duration_ms,
                timestamp: now,
                data: None,
                error: Some(ErrorBody::from(&err)),
            },
        }
    }
}
