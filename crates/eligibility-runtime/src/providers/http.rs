//! HTTP client for the upstream eligibility provider (reqwest).
//!
//! - Token: form-encoded `grant_type=client_credentials` POST
//! - Eligibility: bearer-authenticated JSON POST
//!
//! Every request carries the configured timeout. Non-success responses keep
//! the status and any `Retry-After` seconds; transport failures are reduced
//! to a [`TransportCode`] by walking the error's source chain.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::error::Error as _;
use std::time::Duration;

use eligibility_core::{EligibilityRequest, UpstreamEligibility};

use super::{ClientCredentials, TokenGrant, UpstreamClient};
use crate::config::{ConfigError, UpstreamConfig};
use crate::error::{TransportCode, UpstreamError};

/// Longest error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// reqwest-backed [`UpstreamClient`].
pub struct HttpUpstream {
    client: reqwest::Client,
    credentials: ClientCredentials,
    token_url: String,
    eligibility_url: String,
    scope: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpUpstream")
            .field("credentials", &self.credentials)
            .field("token_url", &self.token_url)
            .field("eligibility_url", &self.eligibility_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig, credentials: ClientCredentials) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "upstream".to_string(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            credentials,
            token_url: format!("{}{}", base, config.token_path),
            eligibility_url: format!("{}{}", base, config.eligibility_path),
            scope: config.scope.clone(),
            timeout: config.request_timeout,
        })
    }

    /// Body of a successful response, or the status as an error.
    async fn read_success(response: reqwest::Response) -> Result<Vec<u8>, UpstreamError> {
        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await.map_err(transport_error)?;
            return Ok(body.to_vec());
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let text = response.text().await.unwrap_or_default();
        let message = if text.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("no response body")
                .to_string()
        } else {
            truncate(text.trim(), MAX_ERROR_BODY)
        };

        Err(UpstreamError::Status {
            status: status.as_u16(),
            retry_after,
            message,
        })
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn acquire_token(&self) -> Result<TokenGrant, UpstreamError> {
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id()),
            ("client_secret", self.credentials.expose_secret()),
        ];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }

        let response = self
            .client
            .post(&self.token_url)
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        let body = Self::read_success(response).await?;
        let token: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| UpstreamError::Decode(format!("token response: {}", e)))?;

        Ok(TokenGrant {
            access_token: SecretString::from(token.access_token),
            token_type: token.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in: token.expires_in.map(Duration::from_secs),
        })
    }

    async fn check_eligibility(
        &self,
        token: &SecretString,
        request: &EligibilityRequest,
    ) -> Result<UpstreamEligibility, UpstreamError> {
        let response = self
            .client
            .post(&self.eligibility_url)
            .timeout(self.timeout)
            .bearer_auth(token.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let body = Self::read_success(response).await?;
        serde_json::from_slice(&body)
            .map_err(|e| UpstreamError::Decode(format!("eligibility response: {}", e)))
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn transport_error(err: reqwest::Error) -> UpstreamError {
    UpstreamError::Transport {
        code: transport_code(&err),
        message: err.to_string(),
    }
}

/// Reduce a reqwest error to a transport code.
fn transport_code(err: &reqwest::Error) -> TransportCode {
    if err.is_timeout() {
        return TransportCode::TimedOut;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return match io.kind() {
                std::io::ErrorKind::ConnectionReset => TransportCode::ConnectionReset,
                std::io::ErrorKind::ConnectionRefused => TransportCode::ConnectionRefused,
                std::io::ErrorKind::ConnectionAborted => TransportCode::ConnectionAborted,
                std::io::ErrorKind::TimedOut => TransportCode::TimedOut,
                _ => TransportCode::Other,
            };
        }
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return TransportCode::DnsFailure;
        }
        source = cause.source();
    }

    TransportCode::Other
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{Classify, FailureTag};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upstream(base_url: &str) -> HttpUpstream {
        let config = UpstreamConfig {
            base_url: base_url.to_string(),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        HttpUpstream::new(&config, ClientCredentials::new("clinic-app", "s3cret")).unwrap()
    }

    fn request() -> EligibilityRequest {
        serde_json::from_value(serde_json::json!({
            "controlNumber": "123456789",
            "tradingPartnerServiceId": "60054",
            "provider": { "organizationName": "Clinic", "npi": "1999999984" },
            "subscriber": {
                "memberId": "W000000000",
                "firstName": "Jordan",
                "lastName": "Avery",
                "dateOfBirth": "19870512",
                "gender": "F"
            },
            "encounter": { "serviceTypeCodes": ["98", "88"], "dateOfService": "20240315" }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_token_uses_client_credentials_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=clinic-app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = upstream(&server.uri()).acquire_token().await.unwrap();
        assert_eq!(grant.access_token.expose_secret(), "tok-1");
        assert_eq!(grant.expires_in, Some(Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn test_eligibility_sends_bearer_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/eligibility/v3"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "controlNumber": "123456789",
                "benefitsInformation": [
                    { "code": "1", "name": "Active Coverage", "serviceTypeCodes": ["88"] }
                ]
            })))
            .mount(&server)
            .await;

        let token = SecretString::from("tok-1".to_string());
        let payload = upstream(&server.uri())
            .check_eligibility(&token, &request())
            .await
            .unwrap();
        assert_eq!(payload.benefits_information.len(), 1);
        assert!(payload.benefits_information[0].covers("88"));
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/eligibility/v3"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
            .mount(&server)
            .await;

        let token = SecretString::from("tok".to_string());
        let err = upstream(&server.uri())
            .check_eligibility(&token, &request())
            .await
            .unwrap_err();

        assert_eq!(
            err.failure_tag(),
            FailureTag::Status {
                status: 429,
                retry_after: Some(Duration::from_secs(2))
            }
        );
    }

    #[tokio::test]
    async fn test_error_body_becomes_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid NPI"))
            .mount(&server)
            .await;

        let token = SecretString::from("tok".to_string());
        let err = upstream(&server.uri())
            .check_eligibility(&token, &request())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            UpstreamError::Status {
                status: 400,
                retry_after: None,
                message: "Invalid NPI".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = upstream(&server.uri()).acquire_token().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Decode(_)));
    }

    #[tokio::test]
    async fn test_slow_response_is_timed_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access_token": "late" }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = upstream(&server.uri()).acquire_token().await.unwrap_err();
        assert_eq!(err.failure_tag(), FailureTag::Transport(TransportCode::TimedOut));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let err = upstream("http://127.0.0.1:1").acquire_token().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Transport { .. }));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é...");
    }
}
