//! Upstream eligibility payload.
//!
//! Only the fields normalization reads are modelled; everything else in the
//! provider's response is ignored on deserialization.

use serde::{Deserialize, Serialize};

/// Subscriber echo from the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamSubscriber {
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

/// Provider echo.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamProvider {
    #[serde(default)]
    pub npi: Option<String>,
    #[serde(default)]
    pub provider_name: Option<String>,
}

/// Payer echo.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamPayer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub payor_identification: Option<String>,
}

/// One benefit entry (X12 EB segment).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamBenefit {
    /// Eligibility/benefit status code ("1" = active coverage)
    #[serde(default)]
    pub code: Option<String>,

    /// Human-readable status name
    #[serde(default)]
    pub name: Option<String>,

    /// Service types this entry applies to
    #[serde(default)]
    pub service_type_codes: Vec<String>,
}

impl UpstreamBenefit {
    /// Whether this entry denotes active coverage.
    pub fn is_active_coverage(&self) -> bool {
        if self.code.as_deref().map(str::trim) == Some("1") {
            return true;
        }

        match &self.name {
            Some(name) => {
                let name = name.to_ascii_lowercase();
                name.contains("active coverage") && !name.contains("inactive")
            }
            None => false,
        }
    }

    /// Whether this entry applies to `code`.
    pub fn covers(&self, code: &str) -> bool {
        self.service_type_codes
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(code))
    }
}

/// Provider-side error echo (AAA segment).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamIssue {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// The eligibility response body from the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamEligibility {
    #[serde(default)]
    pub control_number: Option<String>,
    #[serde(default)]
    pub subscriber: Option<UpstreamSubscriber>,
    #[serde(default)]
    pub provider: Option<UpstreamProvider>,
    #[serde(default)]
    pub payer: Option<UpstreamPayer>,
    #[serde(default)]
    pub benefits_information: Vec<UpstreamBenefit>,
    #[serde(default)]
    pub errors: Vec<UpstreamIssue>,
}
