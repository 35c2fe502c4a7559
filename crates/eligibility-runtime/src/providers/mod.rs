//! Upstream eligibility provider abstractions.
//!
//! [`UpstreamClient`] is the seam between the orchestrator and the network:
//! one call to obtain a client-credentials token and one to run an
//! eligibility check. Errors come back as the closed [`UpstreamError`] tag
//! set so retry classification never inspects transport internals.
//!
//! ## Security
//!
//! Client secrets and access tokens travel as [`secrecy::SecretString`] and
//! never appear in `Debug` output.

use async_trait::async_trait;
use secrecy::SecretString;
use std::time::Duration;

use eligibility_core::{EligibilityRequest, UpstreamEligibility};

use crate::error::UpstreamError;

mod credentials;
#[cfg(feature = "http")]
mod http;

pub use credentials::{ClientCredentials, CLIENT_ID_ENV, CLIENT_SECRET_ENV};
#[cfg(feature = "http")]
pub use http::HttpUpstream;

/// A token returned by the provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: SecretString,

    /// Usually "Bearer"
    pub token_type: String,

    /// Server-reported lifetime, if any
    pub expires_in: Option<Duration>,
}

/// Client for the upstream eligibility provider.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Obtain a new access token (client-credentials grant).
    async fn acquire_token(&self) -> Result<TokenGrant, UpstreamError>;

    /// Run one eligibility check with `token`.
    async fn check_eligibility(
        &self,
        token: &SecretString,
        request: &EligibilityRequest,
    ) -> Result<UpstreamEligibility, UpstreamError>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
