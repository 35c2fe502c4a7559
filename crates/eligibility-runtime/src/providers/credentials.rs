//! OAuth client credentials for the upstream provider.
//!
//! Loaded from configuration with environment fallback:
//!
//! ```ignore
//! let creds = ClientCredentials::from_config(&config.upstream)?;
//! form.push(("client_secret", creds.expose_secret()));
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use crate::config::{ConfigError, UpstreamConfig};

/// Environment variable consulted when `upstream.client_id` is not configured.
pub const CLIENT_ID_ENV: &str = "ELIGIBILITY_CLIENT_ID";

/// Environment variable consulted when `upstream.client_secret` is not configured.
pub const CLIENT_SECRET_ENV: &str = "ELIGIBILITY_CLIENT_SECRET";

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Environment,
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// Client id and secret for the client-credentials grant.
///
/// `Debug` and `Display` never print the secret.
#[derive(Clone)]
pub struct ClientCredentials {
    client_id: String,
    client_secret: SecretString,
    source: CredentialSource,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            source: CredentialSource::Programmatic,
        }
    }

    /// Load from config, falling back to `ELIGIBILITY_CLIENT_ID` and
    /// `ELIGIBILITY_CLIENT_SECRET`.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, ConfigError> {
        Self::from_config_with(config, |var| std::env::var(var).ok())
    }

    /// Like [`from_config`](Self::from_config) with a custom variable lookup.
    pub fn from_config_with<F>(config: &UpstreamConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (client_id, id_source) =
            resolve(config.client_id.as_deref(), CLIENT_ID_ENV, "upstream.client_id", &lookup)?;
        let (client_secret, secret_source) = resolve(
            config.client_secret.as_deref(),
            CLIENT_SECRET_ENV,
            "upstream.client_secret",
            &lookup,
        )?;

        let source = if id_source == CredentialSource::Environment
            || secret_source == CredentialSource::Environment
        {
            CredentialSource::Environment
        } else {
            CredentialSource::Config
        };

        Ok(Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            source,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Expose the secret at the point of use. Never store the result.
    pub fn expose_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

fn resolve<F>(
    configured: Option<&str>,
    env_var: &str,
    config_key: &str,
    lookup: &F,
) -> Result<(String, CredentialSource), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = configured.filter(|v| !v.trim().is_empty()) {
        return Ok((value.to_string(), CredentialSource::Config));
    }
    if let Some(value) = lookup(env_var).filter(|v| !v.trim().is_empty()) {
        return Ok((value, CredentialSource::Environment));
    }
    Err(ConfigError::MissingCredential(format!(
        "set '{}' in config or the {} environment variable",
        config_key, env_var
    )))
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client '{}' from {} [REDACTED]", self.client_id, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_config_wins() {
        let config = UpstreamConfig {
            client_id: Some("clinic-app".to_string()),
            client_secret: Some("s3cret".to_string()),
            ..Default::default()
        };
        let creds = ClientCredentials::from_config_with(&config, |_| Some("env".to_string())).unwrap();
        assert_eq!(creds.client_id(), "clinic-app");
        assert_eq!(creds.expose_secret(), "s3cret");
        assert_eq!(creds.source(), CredentialSource::Config);
    }

    #[test]
    fn test_env_fallback() {
        let config = UpstreamConfig::default();
        let creds = ClientCredentials::from_config_with(&config, |var| match var {
            CLIENT_ID_ENV => Some("from-env".to_string()),
            CLIENT_SECRET_ENV => Some("env-secret".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(creds.client_id(), "from-env");
        assert_eq!(creds.source(), CredentialSource::Environment);
    }

    #[test]
    fn test_missing_secret_is_error() {
        let config = UpstreamConfig {
            client_id: Some("clinic-app".to_string()),
            ..Default::default()
        };
        let err = ClientCredentials::from_config_with(&config, no_env).unwrap_err();
        assert!(err.to_string().contains(CLIENT_SECRET_ENV));
    }

    #[test]
    fn test_secret_never_formatted() {
        let creds = ClientCredentials::new("clinic-app", "s3cret");
        assert!(!format!("{:?}", creds).contains("s3cret"));
        assert!(!format!("{}", creds).contains("s3cret"));
    }
}
