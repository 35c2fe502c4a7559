//! Shape an upstream payload into an [`EligibilityResult`].
//!
//! For each requested service type the first upstream benefit entry that
//! lists the code decides coverage. Codes no entry mentions are reported
//! as not covered. The request is eligible when any requested code is covered.

use chrono::{DateTime, Utc};

use crate::payload::UpstreamEligibility;
use crate::request::EligibilityRequest;
use crate::result::{
    BenefitCoverage, CoverageStatus, EligibilityResult, MemberIdentity, PayerIdentity,
};
use crate::service_types;

/// Normalize an upstream payload for `request`.
pub fn normalize(
    request: &EligibilityRequest,
    payload: &UpstreamEligibility,
    correlation_id: &str,
    now: DateTime<Utc>,
) -> EligibilityResult {
    let benefits: Vec<BenefitCoverage> = request
        .normalized_service_type_codes()
        .into_iter()
        .map(|code| {
            let matched = payload
                .benefits_information
                .iter()
                .find(|benefit| benefit.covers(&code));

            BenefitCoverage {
                service_type_name: service_types::describe(&code).map(str::to_string),
                covered: matched.map(|b| b.is_active_coverage()).unwrap_or(false),
                status_code: matched.and_then(|b| b.code.clone()),
                status_name: matched.and_then(|b| b.name.clone()),
                service_type_code: code,
            }
        })
        .collect();

    let eligible = benefits.iter().any(|b| b.covered);

    let status = if eligible {
        CoverageStatus::Active
    } else if !payload.errors.is_empty() && payload.benefits_information.is_empty() {
        CoverageStatus::Error
    } else {
        CoverageStatus::Inactive
    };

    EligibilityResult {
        eligible,
        status,
        member: member_identity(request, payload),
        payer: payload.payer.as_ref().map(|payer| PayerIdentity {
            name: payer.name.clone(),
            payer_id: payer.payor_identification.clone(),
        }),
        benefits,
        errors: payload.errors.clone(),
        correlation_id: correlation_id.to_string(),
        timestamp: now,
        from_cache: false,
    }
}

/// Prefer the provider's subscriber echo, field by field, over the request.
fn member_identity(request: &EligibilityRequest, payload: &UpstreamEligibility) -> MemberIdentity {
    let sent = &request.subscriber;
    let echo = payload.subscriber.clone().unwrap_or_default();

    MemberIdentity {
        member_id: echo.member_id.unwrap_or_else(|| sent.member_id.clone()),
        first_name: echo.first_name.unwrap_or_else(|| sent.first_name.clone()),
        last_name: echo.last_name.unwrap_or_else(|| sent.last_name.clone()),
        date_of_birth: echo.date_of_birth.unwrap_or_else(|| sent.date_of_birth.clone()),
    }
}
