//! Field-level validation of eligibility requests.
//!
//! Validation runs before any network activity. Every violation is collected
//! so the caller can fix the whole request in one round trip.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use thiserror::Error;

use crate::request::EligibilityRequest;
use crate::service_types;

lazy_static! {
    static ref CONTROL_NUMBER: Regex = Regex::new(r"^\d{9}$").unwrap();
    static ref NPI: Regex = Regex::new(r"^\d{10}$").unwrap();
    static ref DATE: Regex = Regex::new(r"^\d{8}$").unwrap();
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Dotted path of the offending field (e.g., "subscriber.gender")
    pub field: String,

    /// What is wrong with it
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A request failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("request validation failed: {}", join_violations(.violations))]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Build an error from collected violations.
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    /// Build an error with a single violation.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    /// All violations, in discovery order.
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }
}

/// Accumulates violations while walking a request.
#[derive(Default)]
struct Violations(Vec<FieldViolation>);

impl Violations {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldViolation {
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn required(&mut self, field: &str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.push(field, "is required");
            false
        } else {
            true
        }
    }

    fn date(&mut self, field: &str, value: &str) {
        if !DATE.is_match(value) || NaiveDate::parse_from_str(value, "%Y%m%d").is_err() {
            self.push(field, "must be a calendar date formatted YYYYMMDD");
        }
    }
}

/// Validate a request against the field rules and the service-type dictionary.
pub fn validate(request: &EligibilityRequest) -> Result<(), ValidationError> {
    let mut v = Violations::default();

    if v.required("controlNumber", &request.control_number)
        && !CONTROL_NUMBER.is_match(&request.control_number)
    {
        v.push("controlNumber", "must be exactly 9 digits");
    }

    v.required("tradingPartnerServiceId", &request.trading_partner_service_id);

    if v.required("provider.npi", &request.provider.npi) && !NPI.is_match(&request.provider.npi) {
        v.push("provider.npi", "must be exactly 10 digits");
    }

    let subscriber = &request.subscriber;
    v.required("subscriber.memberId", &subscriber.member_id);
    v.required("subscriber.firstName", &subscriber.first_name);
    v.required("subscriber.lastName", &subscriber.last_name);

    if v.required("subscriber.dateOfBirth", &subscriber.date_of_birth) {
        v.date("subscriber.dateOfBirth", &subscriber.date_of_birth);
    }

    if v.required("subscriber.gender", &subscriber.gender)
        && !matches!(subscriber.gender.as_str(), "M" | "F")
    {
        v.push("subscriber.gender", "must be M or F");
    }

    let encounter = &request.encounter;
    if encounter.service_type_codes.is_empty() {
        v.push("encounter.serviceTypeCodes", "must contain at least one code");
    }

    for (index, code) in encounter.service_type_codes.iter().enumerate() {
        let field = format!("encounter.serviceTypeCodes[{}]", index);
        let normalized = code.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            v.push(&field, "is required");
        } else if !service_types::is_known(&normalized) {
            v.push(&field, format!("unknown service type code '{}'", code));
        }
    }

    if let Some(date) = &encounter.date_of_service {
        v.date("encounter.dateOfService", date);
    }

    if v.0.is_empty() {
        Ok(())
    } else {
        tracing::debug!(violations = v.0.len(), "Request rejected by validation");
        Err(ValidationError::new(v.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::fixtures::valid_request;

    fn fields(err: &ValidationError) -> Vec<&str> {
        err.violations().iter().map(|v| v.field.as_str()).collect()
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(validate(&valid_request()).is_ok());
    }

    #[test]
    fn test_control_number_must_be_nine_digits() {
        let mut request = valid_request();
        request.control_number = "12345678".to_string();

        let err = validate(&request).unwrap_err();
        assert_eq!(fields(&err), vec!["controlNumber"]);
    }

    #[test]
    fn test_npi_must_be_ten_digits() {
        let mut request = valid_request();
        request.provider.npi = "19999999A4".to_string();

        let err = validate(&request).unwrap_err();
        assert_eq!(fields(&err), vec!["provider.npi"]);
    }

    #[test]
    fn test_gender_must_be_m_or_f() {
        let mut request = valid_request();
        request.subscriber.gender = "X".to_string();

        let err = validate(&request).unwrap_err();
        assert_eq!(err.violations()[0].message, "must be M or F");
    }

    #[test]
    fn test_dates_must_be_real() {
        let mut request = valid_request();
        request.subscriber.date_of_birth = "19870231".to_string();
        request.encounter.date_of_service = Some("2024-03-15".to_string());

        let err = validate(&request).unwrap_err();
        assert_eq!(
            fields(&err),
            vec!["subscriber.dateOfBirth", "encounter.dateOfService"]
        );
    }

    #[test]
    fn test_empty_service_types_rejected() {
        let mut request = valid_request();
        request.encounter.service_type_codes.clear();

        let err = validate(&request).unwrap_err();
        assert_eq!(fields(&err), vec!["encounter.serviceTypeCodes"]);
    }

    #[test]
    fn test_unknown_service_type_rejected() {
        let mut request = valid_request();
        request.encounter.service_type_codes.push("ZZ9".to_string());

        let err = validate(&request).unwrap_err();
        assert_eq!(fields(&err), vec!["encounter.serviceTypeCodes[2]"]);
        assert!(err.to_string().contains("ZZ9"));
    }

    #[test]
    fn test_all_violations_collected() {
        let mut request = valid_request();
        request.control_number = String::new();
        request.subscriber.member_id = " ".to_string();
        request.subscriber.gender = "U".to_string();

        let err = validate(&request).unwrap_err();
        assert_eq!(
            fields(&err),
            vec!["controlNumber", "subscriber.memberId", "subscriber.gender"]
        );
    }
}
