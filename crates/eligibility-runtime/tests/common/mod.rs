//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::SecretString;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use eligibility_core::{EligibilityRequest, UpstreamBenefit, UpstreamEligibility};
use eligibility_runtime::store::StoreResult;
use eligibility_runtime::{
    KeyValueStore, RetryPolicy, RuntimeConfig, StoreError, TokenGrant, UpstreamClient,
    UpstreamError,
};

/// A valid request for service types 98 and 88.
pub fn request() -> EligibilityRequest {
    request_for("W000000000", &["98", "88"])
}

pub fn request_for(member_id: &str, codes: &[&str]) -> EligibilityRequest {
    serde_json::from_value(serde_json::json!({
        "controlNumber": "123456789",
        "tradingPartnerServiceId": "60054",
        "provider": { "organizationName": "Riverside Clinic", "npi": "1999999984" },
        "subscriber": {
            "memberId": member_id,
            "firstName": "Jordan",
            "lastName": "Avery",
            "dateOfBirth": "19870512",
            "gender": "F"
        },
        "encounter": { "serviceTypeCodes": codes, "dateOfService": "20240315" }
    }))
    .unwrap()
}

/// Active pharmacy coverage, non-covered 41/54.
pub fn pharmacy_payload() -> UpstreamEligibility {
    UpstreamEligibility {
        benefits_information: vec![
            UpstreamBenefit {
                code: Some("1".to_string()),
                name: Some("Active Coverage".to_string()),
                service_type_codes: vec!["88".to_string()],
            },
            UpstreamBenefit {
                code: Some("I".to_string()),
                name: Some("Non-Covered".to_string()),
                service_type_codes: vec!["41".to_string(), "54".to_string()],
            },
        ],
        ..Default::default()
    }
}

pub fn status(status: u16, retry_after: Option<Duration>) -> UpstreamError {
    UpstreamError::Status {
        status,
        retry_after,
        message: format!("status {}", status),
    }
}

/// Default config with short data-call backoff.
pub fn fast_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.retry = RetryPolicy {
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        ..RetryPolicy::data()
    };
    config
}

type DataResponse = Result<UpstreamEligibility, UpstreamError>;

/// Upstream double replaying queued data responses.
#[derive(Default)]
pub struct MockUpstream {
    pub token_calls: AtomicU32,
    pub data_calls: AtomicU32,
    token_delay: Mutex<Duration>,
    data: Mutex<VecDeque<(Duration, DataResponse)>>,
}

impl MockUpstream {
    pub fn push_data(&self, response: DataResponse) {
        self.push_slow_data(Duration::ZERO, response);
    }

    /// Queue a response that arrives after `delay`.
    pub fn push_slow_data(&self, delay: Duration, response: DataResponse) {
        self.data.lock().push_back((delay, response));
    }

    /// Delay every token grant by `delay`.
    pub fn set_token_delay(&self, delay: Duration) {
        *self.token_delay.lock() = delay;
    }

    pub fn token_calls(&self) -> u32 {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn data_calls(&self) -> u32 {
        self.data_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn acquire_token(&self) -> Result<TokenGrant, UpstreamError> {
        let n = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.token_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(TokenGrant {
            access_token: SecretString::from(format!("token-{}", n)),
            token_type: "Bearer".to_string(),
            expires_in: Some(Duration::from_secs(3600)),
        })
    }

    async fn check_eligibility(
        &self,
        _token: &SecretString,
        _request: &EligibilityRequest,
    ) -> Result<UpstreamEligibility, UpstreamError> {
        self.data_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.data.lock().pop_front();
        let (delay, response) = next.unwrap_or_else(|| (Duration::ZERO, Ok(pharmacy_payload())));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        response
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A store that refuses every connection.
#[derive(Default)]
pub struct UnreachableStore;

#[async_trait]
impl KeyValueStore for UnreachableStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(false)
    }

    fn provider_name(&self) -> &'static str {
        "unreachable"
    }
}
