//! Inbound eligibility request.
//!
//! Field names follow the upstream wire format (camelCase), so a request
//! accepted at the boundary can be forwarded to the provider unchanged.

use serde::{Deserialize, Serialize};

use crate::schema::validate_request_schema;
use crate::validation::ValidationError;

/// Rendering provider for the encounter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    /// Practice or facility name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,

    /// National Provider Identifier (10 digits)
    pub npi: String,
}

/// The insured member the question is about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    /// Payer-assigned member id
    pub member_id: String,

    pub first_name: String,

    pub last_name: String,

    /// Date of birth, `YYYYMMDD`
    pub date_of_birth: String,

    /// `M` or `F`
    pub gender: String,
}

/// What is being asked about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    /// Requested service-type codes (X12 EB03)
    pub service_type_codes: Vec<String>,

    /// Date of service, `YYYYMMDD`. Upstream assumes "today" when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_service: Option<String>,
}

/// An eligibility check request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRequest {
    /// Interchange control number (9 digits)
    pub control_number: String,

    /// Payer id the request is routed to
    pub trading_partner_service_id: String,

    pub provider: Provider,

    pub subscriber: Subscriber,

    pub encounter: Encounter,
}

impl EligibilityRequest {
    /// Parse a request from raw JSON.
    ///
    /// The document is checked against the embedded request schema before
    /// deserialization, so structural problems are reported with their
    /// JSON paths instead of as a serde error.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ValidationError::single("$", format!("invalid JSON: {}", e)))?;

        validate_request_schema(&value)?;

        serde_json::from_value(value)
            .map_err(|e| ValidationError::single("$", format!("invalid request: {}", e)))
    }

    /// Service-type codes trimmed, upper-cased and de-duplicated.
    ///
    /// First-seen order is preserved; the result reports benefits in this order.
    pub fn normalized_service_type_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = Vec::with_capacity(self.encounter.service_type_codes.len());
        for code in &self.encounter.service_type_codes {
            let code = code.trim().to_ascii_uppercase();
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        codes
    }
}
