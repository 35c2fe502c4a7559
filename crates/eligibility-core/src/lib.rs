//! # eligibility-core
//!
//! Deterministic domain layer for patient eligibility checks.
//!
//! This crate answers the questions that need no network:
//! - Is this request well formed?
//! - Which cache key does it map to?
//! - Given the provider's payload, which requested service types are covered?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same request and payload always produce the same result
//! 2. **No I/O**: nothing here talks to the provider, the token store or the cache
//! 3. **Stable keys**: fingerprints are SHA-256 over a canonical form, identical
//!    across processes
//!
//! ## Example
//!
//! ```rust,ignore
//! use eligibility_core::{EligibilityRequest, RequestFingerprint, validate};
//!
//! let request = EligibilityRequest::from_json(body)?;
//! validate(&request)?;
//! let key = RequestFingerprint::of(&request);
//! ```

pub mod fingerprint;
pub mod normalize;
pub mod payload;
pub mod request;
pub mod result;
pub mod schema;
pub mod service_types;
pub mod validation;

// Re-export main types at crate root
pub use fingerprint::RequestFingerprint;
pub use normalize::normalize;
pub use payload::{
    UpstreamBenefit, UpstreamEligibility, UpstreamIssue, UpstreamPayer, UpstreamProvider,
    UpstreamSubscriber,
};
pub use request::{EligibilityRequest, Encounter, Provider, Subscriber};
pub use result::{
    BenefitCoverage, CoverageStatus, EligibilityResult, MemberIdentity, PayerIdentity,
};
pub use validation::{validate, FieldViolation, ValidationError};
