//! Access-token lifecycle for the upstream provider.

use thiserror::Error;

mod manager;
mod token;

pub use manager::TokenManager;
pub use token::AccessToken;

use crate::error::EligibilityError;

/// Errors from token acquisition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// The token endpoint refused or failed
    #[error("token acquisition failed: {0}")]
    Failed(String),

    /// The token endpoint's breaker is open
    #[error("token endpoint unavailable: {0}")]
    Unavailable(String),
}

impl From<AuthError> for EligibilityError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Failed(msg) => EligibilityError::AuthFailed(msg),
            AuthError::Unavailable(msg) => EligibilityError::AuthUnavailable(msg),
        }
    }
}
