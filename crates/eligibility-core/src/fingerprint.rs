//! Deterministic request fingerprint used as the response-cache key.
//!
//! The fingerprint covers member id, provider NPI, service-type codes and
//! service date. Codes are sorted and de-duplicated, so requests that differ
//! only in code order share a key. SHA-256 keeps the key stable across
//! processes and toolchains, which matters because it lives in a shared store.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::request::EligibilityRequest;

/// Canonical JSON of the fields that identify a request.
///
/// Written by hand so the key layout is fixed here and producing it cannot
/// fail. Strings are quoted and escaped through `serde_json::Value`.
fn canonical_form(request: &EligibilityRequest) -> String {
    let mut codes = request.normalized_service_type_codes();
    codes.sort();

    let date_of_service = match request.encounter.date_of_service.as_deref() {
        Some(date) => quoted(date.trim()),
        None => "null".to_string(),
    };

    format!(
        "{{\"member_id\":{},\"npi\":{},\"service_type_codes\":{},\"date_of_service\":{}}}",
        quoted(request.subscriber.member_id.trim()),
        quoted(request.provider.npi.trim()),
        Value::from(codes),
        date_of_service,
    )
}

fn quoted(value: &str) -> String {
    Value::from(value).to_string()
}

/// Hex-encoded SHA-256 fingerprint of a normalized request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// Compute the fingerprint of a request.
    pub fn of(request: &EligibilityRequest) -> Self {
        let digest = Sha256::digest(canonical_form(request).as_bytes());
        Self(hex::encode(digest))
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::fixtures::valid_request;
    use proptest::prelude::*;

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = RequestFingerprint::of(&valid_request());
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_canonical_form_layout() {
        assert_eq!(
            canonical_form(&valid_request()),
            r#"{"member_id":"W000000000","npi":"1999999984","service_type_codes":["88","98"],"date_of_service":"20240315"}"#
        );

        let mut request = valid_request();
        request.encounter.date_of_service = None;
        assert!(canonical_form(&request).ends_with(r#""date_of_service":null}"#));
    }

    #[test]
    fn test_quotes_in_fields_cannot_forge_another_key() {
        let mut a = valid_request();
        a.subscriber.member_id = r#"W1","npi":"2"#.to_string();
        let mut b = valid_request();
        b.subscriber.member_id = "W1".to_string();
        b.provider.npi = "2".to_string();

        assert!(canonical_form(&a).contains(r#"W1\",\"npi\":\"2"#));
        assert_ne!(RequestFingerprint::of(&a), RequestFingerprint::of(&b));
    }

    #[test]
    fn test_code_order_does_not_matter() {
        let a = valid_request();
        let mut b = valid_request();
        b.encounter.service_type_codes.reverse();

        assert_eq!(RequestFingerprint::of(&a), RequestFingerprint::of(&b));
    }

    #[test]
    fn test_non_key_fields_ignored() {
        let a = valid_request();
        let mut b = valid_request();
        b.control_number = "987654321".to_string();
        b.subscriber.first_name = "Sam".to_string();

        assert_eq!(RequestFingerprint::of(&a), RequestFingerprint::of(&b));
    }

    #[test]
    fn test_missing_date_differs_from_present() {
        let a = valid_request();
        let mut b = valid_request();
        b.encounter.date_of_service = None;

        assert_ne!(RequestFingerprint::of(&a), RequestFingerprint::of(&b));
    }

    fn code() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["1", "30", "33", "35", "47", "88", "98", "AL", "MH", "UC"])
            .prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn prop_permutations_share_fingerprint(
            codes in prop::collection::vec(code(), 1..6),
            seed in any::<u64>(),
        ) {
            let mut a = valid_request();
            a.encounter.service_type_codes = codes.clone();

            let mut shuffled = codes;
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            let mut b = valid_request();
            b.encounter.service_type_codes = shuffled;

            prop_assert_eq!(RequestFingerprint::of(&a), RequestFingerprint::of(&b));
        }

        #[test]
        fn prop_member_id_changes_fingerprint(
            left in "[A-Z0-9]{4,12}",
            right in "[A-Z0-9]{4,12}",
        ) {
            prop_assume!(left != right);

            let mut a = valid_request();
            a.subscriber.member_id = left;
            let mut b = valid_request();
            b.subscriber.member_id = right;

            prop_assert_ne!(RequestFingerprint::of(&a), RequestFingerprint::of(&b));
        }

        #[test]
        fn prop_service_date_changes_fingerprint(
            day_a in 1u32..=28,
            day_b in 1u32..=28,
        ) {
            prop_assume!(day_a != day_b);

            let mut a = valid_request();
            a.encounter.date_of_service = Some(format!("202403{:02}", day_a));
            let mut b = valid_request();
            b.encounter.date_of_service = Some(format!("202403{:02}", day_b));

            prop_assert_ne!(RequestFingerprint::of(&a), RequestFingerprint::of(&b));
        }
    }
}
