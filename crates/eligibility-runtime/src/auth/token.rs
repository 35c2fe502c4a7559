//! Access token as persisted in the shared store.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::providers::TokenGrant;

/// An access token with its validity window.
///
/// `Debug` never prints the token value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    value: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

impl AccessToken {
    pub fn new(
        value: impl Into<String>,
        token_type: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            value: value.into(),
            token_type: token_type.into(),
            expires_at: issued_at
                .checked_add_signed(to_chrono(lifetime))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            issued_at,
        }
    }

    /// Build from a provider grant; `default_lifetime` applies when the
    /// provider does not report one.
    pub fn from_grant(grant: &TokenGrant, now: DateTime<Utc>, default_lifetime: Duration) -> Self {
        Self::new(
            grant.access_token.expose_secret(),
            grant.token_type.clone(),
            now,
            grant.expires_in.unwrap_or(default_lifetime),
        )
    }

    /// Usable when `now < expires_at - buffer`.
    pub fn is_usable(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expires_at
            .checked_sub_signed(to_chrono(buffer))
            .is_some_and(|refresh_at| now < refresh_at)
    }

    /// Time left before actual expiry (zero once expired).
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Total validity window.
    pub fn lifetime(&self) -> Duration {
        (self.expires_at - self.issued_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// The token value.
    pub fn secret(&self) -> SecretString {
        SecretString::from(self.value.clone())
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_until_buffer() {
        let issued = Utc::now();
        let token = AccessToken::new("abc", "Bearer", issued, Duration::from_secs(3600));
        let buffer = Duration::from_secs(300);

        assert!(token.is_usable(issued, buffer));
        assert!(token.is_usable(issued + chrono::Duration::seconds(3299), buffer));
        assert!(!token.is_usable(issued + chrono::Duration::seconds(3300), buffer));
        assert_eq!(token.lifetime(), Duration::from_secs(3600));
    }

    #[test]
    fn test_default_lifetime_applies() {
        let grant = TokenGrant {
            access_token: SecretString::from("abc".to_string()),
            token_type: "Bearer".to_string(),
            expires_in: None,
        };
        let now = Utc::now();
        let token = AccessToken::from_grant(&grant, now, Duration::from_secs(600));
        assert_eq!(token.expires_at, now + chrono::Duration::seconds(600));
        assert_eq!(token.secret().expose_secret(), "abc");
    }

    #[test]
    fn test_debug_redacts_value() {
        let token = AccessToken::new("super-secret", "Bearer", Utc::now(), Duration::from_secs(60));
        let debug = format!("{:?}", token);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_store_format_is_camel_case() {
        let token = AccessToken::new("v", "Bearer", Utc::now(), Duration::from_secs(60));
        let json = serde_json::to_value(&token).unwrap();
        assert!(json.get("expiresAt").is_some());
        assert!(json.get("tokenType").is_some());
        let back: AccessToken = serde_json::from_value(json).unwrap();
        assert_eq!(back, token);
    }
}
