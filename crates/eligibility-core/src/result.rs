//! Normalized eligibility result returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::UpstreamIssue;

/// Overall coverage status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageStatus {
    /// At least one requested service type is covered
    Active,

    /// Nothing requested is covered
    Inactive,

    /// The provider reported errors and returned no benefits
    Error,
}

/// Who the result is about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemberIdentity {
    pub member_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
}

/// Which payer answered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PayerIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer_id: Option<String>,
}

/// Coverage fact for one requested service type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BenefitCoverage {
    /// The requested code
    pub service_type_code: String,

    /// Dictionary name for the code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type_name: Option<String>,

    pub covered: bool,

    /// Status code of the matching upstream entry, if one matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,

    /// Status name of the matching upstream entry, if one matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_name: Option<String>,
}

/// Result of one eligibility check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResult {
    pub eligible: bool,

    pub status: CoverageStatus,

    pub member: MemberIdentity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<PayerIdentity>,

    /// One entry per requested code, in request order
    pub benefits: Vec<BenefitCoverage>,

    /// Provider-side errors, echoed for the `error` status
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<UpstreamIssue>,

    pub correlation_id: String,

    pub timestamp: DateTime<Utc>,

    /// Set when the result was served from the response cache
    #[serde(default)]
    pub from_cache: bool,
}

impl EligibilityResult {
    /// Coverage entry for a code, if it was requested.
    pub fn benefit(&self, service_type_code: &str) -> Option<&BenefitCoverage> {
        self.benefits
            .iter()
            .find(|b| b.service_type_code == service_type_code)
    }
}
